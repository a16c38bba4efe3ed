//! Timed, acknowledgement-free handshake.
//!
//! The camera never confirms a frame, so ordering comes from fixed delays
//! measured from the connect instant:
//! ```text
//! t=0      request line
//! t=50ms   auth frame
//! t=100ms  start frame
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::BubbleError;
use crate::protocol::{request_line, Credentials, START_BLOB};

/// Outbound frames, in send order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeFrame {
    Request,
    Auth,
    Start,
}

impl fmt::Display for HandshakeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeFrame::Request => "request",
            HandshakeFrame::Auth => "auth",
            HandshakeFrame::Start => "start",
        };
        f.write_str(name)
    }
}

/// Delays from connect to each timed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeTiming {
    pub auth_delay: Duration,
    pub start_delay: Duration,
}

impl Default for HandshakeTiming {
    fn default() -> Self {
        Self {
            auth_delay: Duration::from_millis(50),
            start_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandshakeStep {
    pub frame: HandshakeFrame,
    /// Offset from the connect instant
    pub at: Duration,
    pub bytes: Vec<u8>,
}

/// Remaining handshake writes for one connection
#[derive(Debug)]
pub struct Handshake {
    steps: VecDeque<HandshakeStep>,
    connected_at: Instant,
}

impl Handshake {
    pub fn new(
        host: &str,
        channel: u32,
        stream: u32,
        credentials: &Credentials,
        timing: HandshakeTiming,
        connected_at: Instant,
    ) -> Self {
        let steps = VecDeque::from([
            HandshakeStep {
                frame: HandshakeFrame::Request,
                at: Duration::ZERO,
                bytes: request_line(host, channel, stream).into_bytes(),
            },
            HandshakeStep {
                frame: HandshakeFrame::Auth,
                at: timing.auth_delay,
                bytes: credentials.auth_blob().to_vec(),
            },
            HandshakeStep {
                frame: HandshakeFrame::Start,
                at: timing.start_delay,
                bytes: START_BLOB.to_vec(),
            },
        ]);
        Self {
            steps,
            connected_at,
        }
    }

    pub fn steps(&self) -> impl Iterator<Item = &HandshakeStep> {
        self.steps.iter()
    }

    pub fn is_complete(&self) -> bool {
        self.steps.is_empty()
    }

    /// When the next frame is due, or `None` once everything is sent
    pub fn next_deadline(&self) -> Option<Instant> {
        self.steps.front().map(|step| self.connected_at + step.at)
    }

    /// Write the next pending frame
    pub async fn write_next<W>(
        &mut self,
        writer: &mut W,
    ) -> Result<Option<HandshakeFrame>, BubbleError>
    where
        W: AsyncWrite + Unpin,
    {
        let Some(step) = self.steps.pop_front() else {
            return Ok(None);
        };
        writer
            .write_all(&step.bytes)
            .await
            .map_err(|source| BubbleError::Write {
                frame: step.frame,
                source,
            })?;
        Ok(Some(step.frame))
    }
}

/// Sleep until `deadline`, or forever when there is none
pub(crate) async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
