//! Incremental Annex-B framer.
//!
//! The Bubble stream carries no length prefixes, so a NAL unit is only known to
//! be complete once the start code of the following unit has arrived:
//! ```text
//! [garbage] 00 00 00 01 [A ...] 00 00 00 01 [B ...]
//!           |<------ unit ----->|<---- pending ---...
//! ```
//! A trailing unit is never flushed; it stays pending until the next start code.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use crate::protocol::NAL_START_CODE;

const START_CODE_LEN: usize = NAL_START_CODE.len();

/// Errors produced by the framer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramerError {
    #[error("pending buffer holds {pending} bytes, limit is {limit}")]
    BufferOverflow { pending: usize, limit: usize },
}

/// Failure from [`NalFramer::push`], carrying the units completed before it
#[derive(Debug, Error)]
#[error("{source}")]
pub struct PushError {
    /// Units extracted from this chunk; still valid and in order
    pub units: Vec<NalUnit>,
    pub source: FramerError,
}

/// A complete NAL unit, start code included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    data: Bytes,
    pub sequence: u32,
}

impl NalUnit {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Bytes following the start code
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[START_CODE_LEN..]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Offset of the first start code at or after `from`
pub fn find_start_code(haystack: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(START_CODE_LEN)
        .position(|w| w == NAL_START_CODE)
        .map(|pos| pos + from)
}

/// Receive buffer that splits an arbitrarily fragmented byte stream into NAL units.
///
/// Invariant: once `synced`, the buffer begins with a start code and
/// `scan_from` is where the search for the next one resumes.
pub struct NalFramer {
    buffer: BytesMut,
    synced: bool,
    scan_from: usize,
    sequence: u32,
    max_pending: Option<usize>,
}

impl NalFramer {
    /// Create an unbounded framer
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            synced: false,
            scan_from: 0,
            sequence: 0,
            max_pending: None,
        }
    }

    /// Create a framer that fails once more than `limit` bytes stay pending
    pub fn with_max_pending(limit: usize) -> Self {
        Self {
            max_pending: Some(limit),
            ..Self::new()
        }
    }

    /// Append a chunk without extracting units
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Lazily drain every unit that is complete so far
    pub fn units(&mut self) -> Units<'_> {
        Units { framer: self }
    }

    /// Append a chunk and collect all completed units in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `BufferOverflow` if a pending limit is set and the bytes left
    /// over after extraction exceed it. Units completed by this chunk are
    /// handed back inside the error.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<NalUnit>, PushError> {
        self.extend(chunk);
        let units: Vec<NalUnit> = self.units().collect();
        match self.check_pending() {
            Ok(()) => Ok(units),
            Err(source) => Err(PushError { units, source }),
        }
    }

    /// Enforce the pending limit, if any
    pub fn check_pending(&self) -> Result<(), FramerError> {
        match self.max_pending {
            Some(limit) if self.buffer.len() > limit => Err(FramerError::BufferOverflow {
                pending: self.buffer.len(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    /// Bytes received but not yet emitted
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a start code has been seen yet
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    fn next_unit(&mut self) -> Option<NalUnit> {
        if !self.synced {
            match find_start_code(&self.buffer, self.scan_from) {
                Some(start) => {
                    self.buffer.advance(start);
                    self.synced = true;
                    self.scan_from = START_CODE_LEN;
                }
                None => {
                    // Leading bytes are never emitted; keep only a possible
                    // start code prefix.
                    let keep = self.buffer.len().min(START_CODE_LEN - 1);
                    let drop = self.buffer.len() - keep;
                    self.buffer.advance(drop);
                    self.scan_from = 0;
                    return None;
                }
            }
        }

        match find_start_code(&self.buffer, self.scan_from) {
            Some(next) => {
                let data = self.buffer.split_to(next).freeze();
                self.scan_from = START_CODE_LEN;
                let sequence = self.sequence;
                self.sequence = self.sequence.wrapping_add(1);
                Some(NalUnit { data, sequence })
            }
            None => {
                self.scan_from = self
                    .buffer
                    .len()
                    .saturating_sub(START_CODE_LEN - 1)
                    .max(START_CODE_LEN);
                None
            }
        }
    }
}

impl Default for NalFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`NalFramer::units`]
pub struct Units<'a> {
    framer: &'a mut NalFramer,
}

impl Iterator for Units<'_> {
    type Item = NalUnit;

    fn next(&mut self) -> Option<NalUnit> {
        self.framer.next_unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SC: [u8; 4] = NAL_START_CODE;

    fn stream(parts: &[&[u8]]) -> Vec<u8> {
        parts.concat()
    }

    #[test]
    fn test_find_start_code() {
        assert_eq!(find_start_code(&[0, 0, 0, 1], 0), Some(0));
        assert_eq!(find_start_code(&[9, 0, 0, 0, 1, 0, 0, 0, 1], 2), Some(5));
        assert_eq!(find_start_code(&[0, 0, 1], 0), None);
        assert_eq!(find_start_code(&[0, 0, 0, 1], 10), None);
    }

    #[test]
    fn test_garbage_then_one_complete_unit() {
        let mut framer = NalFramer::new();
        let data = stream(&[b"junk", &SC, b"AAA", &SC, b"BB"]);

        let units = framer.push(&data).unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].as_slice(), stream(&[&SC, b"AAA"]).as_slice());
        assert_eq!(units[0].payload(), b"AAA");
        assert_eq!(framer.pending(), stream(&[&SC, b"BB"]).as_slice());
    }

    #[test]
    fn test_no_start_code_emits_nothing() {
        let mut framer = NalFramer::new();
        assert!(framer.push(b"no start code here").unwrap().is_empty());
        assert!(!framer.is_synced());
        assert!(framer.pending_len() < START_CODE_LEN);
    }

    #[test]
    fn test_single_start_code_stays_pending() {
        let mut framer = NalFramer::new();
        assert!(framer.push(&stream(&[&SC, b"frame"])).unwrap().is_empty());
        assert!(framer.is_synced());
        assert_eq!(framer.pending_len(), 9);
    }

    #[test]
    fn test_multiple_units_in_one_chunk() {
        let mut framer = NalFramer::new();
        let data = stream(&[&SC, b"a", &SC, b"bb", &SC, b"ccc", &SC]);

        let units = framer.push(&data).unwrap();

        let payloads: Vec<&[u8]> = units.iter().map(|u| u.payload()).collect();
        assert_eq!(payloads, vec![&b"a"[..], &b"bb"[..], &b"ccc"[..]]);
        assert_eq!(
            units.iter().map(|u| u.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(framer.pending(), &SC);
    }

    #[test]
    fn test_back_to_back_start_codes() {
        let mut framer = NalFramer::new();
        let units = framer.push(&stream(&[&SC, &SC, b"x"])).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].as_slice(), &SC);
        assert!(units[0].payload().is_empty());
    }

    #[test]
    fn test_fragmentation_matches_single_chunk() {
        let data = stream(&[
            b"\x07\x00\x00",
            &SC,
            b"\x67\x42\x00\x1f",
            &SC,
            b"\x68\xce",
            &SC,
            b"\x65\x88\x84\x00\x00\x03\x00",
            &SC,
            b"\x41\x9a",
        ]);

        let mut whole = NalFramer::new();
        let expected: Vec<Vec<u8>> = whole
            .push(&data)
            .unwrap()
            .into_iter()
            .map(|u| u.as_slice().to_vec())
            .collect();
        assert_eq!(expected.len(), 3);

        for chunk_size in 1..=data.len() {
            let mut framer = NalFramer::new();
            let mut got = Vec::new();
            for chunk in data.chunks(chunk_size) {
                got.extend(
                    framer
                        .push(chunk)
                        .unwrap()
                        .into_iter()
                        .map(|u| u.as_slice().to_vec()),
                );
            }
            assert_eq!(got, expected, "chunk size {chunk_size}");
            assert_eq!(framer.pending(), whole.pending());
        }
    }

    #[test]
    fn test_start_code_split_across_chunks() {
        let mut framer = NalFramer::new();
        assert!(framer.push(&[0x00, 0x00]).unwrap().is_empty());
        assert!(framer.push(&[0x00, 0x01, 0xAA, 0x00]).unwrap().is_empty());
        assert!(framer.push(&[0x00, 0x00]).unwrap().is_empty());
        let units = framer.push(&[0x01, 0xBB]).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].as_slice(), &[0x00, 0x00, 0x00, 0x01, 0xAA]);
        assert_eq!(framer.pending(), &[0x00, 0x00, 0x00, 0x01, 0xBB]);
    }

    #[test]
    fn test_units_iterator_is_lazy() {
        let mut framer = NalFramer::new();
        framer.extend(&stream(&[&SC, b"a", &SC, b"b", &SC]));

        let mut units = framer.units();
        assert_eq!(units.next().unwrap().payload(), b"a");
        drop(units);
        assert_eq!(framer.pending(), stream(&[&SC, b"b", &SC]).as_slice());

        assert_eq!(framer.units().count(), 1);
    }

    #[test]
    fn test_pending_limit() {
        let mut framer = NalFramer::with_max_pending(8);
        assert!(framer.push(&stream(&[&SC, b"abc"])).is_ok());
        let err = framer.push(b"defgh").unwrap_err();
        assert_eq!(
            err.source,
            FramerError::BufferOverflow {
                pending: 12,
                limit: 8
            }
        );
        assert!(err.units.is_empty());
    }

    #[test]
    fn test_pending_limit_keeps_completed_units() {
        let mut framer = NalFramer::with_max_pending(6);
        let err = framer
            .push(&stream(&[&SC, b"a", &SC, b"bbbbbbbbb"]))
            .unwrap_err();

        assert_eq!(
            err.source,
            FramerError::BufferOverflow {
                pending: 13,
                limit: 6
            }
        );
        assert_eq!(err.units.len(), 1);
        assert_eq!(err.units[0].as_slice(), stream(&[&SC, b"a"]).as_slice());
        assert_eq!(err.to_string(), "pending buffer holds 13 bytes, limit is 6");
    }

    #[test]
    fn test_pending_limit_counts_leftover_only() {
        let mut framer = NalFramer::with_max_pending(6);
        let units = framer
            .push(&stream(&[&SC, b"a long unit body", &SC, b"x"]))
            .unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(framer.pending_len(), 5);
    }
}
