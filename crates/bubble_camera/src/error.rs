//! Connection error types.

use thiserror::Error;

use crate::framer::FramerError;
use crate::handshake::HandshakeFrame;

/// Errors that end a Bubble connection
#[derive(Debug, Error)]
pub enum BubbleError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {frame} frame: {source}")]
    Write {
        frame: HandshakeFrame,
        #[source]
        source: std::io::Error,
    },
    #[error("socket read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error(transparent)]
    Framer(#[from] FramerError),
}
