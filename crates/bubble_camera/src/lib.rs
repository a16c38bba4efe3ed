//! Bubble protocol camera client.
//!
//! Connects to an IP camera over the proprietary "bubble" HTTP endpoint,
//! performs the timed handshake and splits the raw H264 stream into
//! Annex-B NAL units:
//! - `protocol`: wire constants, auth frame and request line
//! - `handshake`: delay-ordered outbound frames
//! - `framer`: start-code framing across TCP fragmentation
//! - `client`: per-camera connection task and handle
//! - `node`: config-driven camera node feeding an Annex-B sink

pub mod client;
pub mod config;
pub mod error;
pub mod framer;
pub mod handshake;
pub mod lifecycle;
pub mod node;
pub mod protocol;

pub use client::{BubbleStream, StreamConfig, StreamEvent};
pub use config::{CameraConfig, Config, ConfigError};
pub use error::BubbleError;
pub use framer::{find_start_code, FramerError, NalFramer, NalUnit, PushError};
pub use handshake::{Handshake, HandshakeFrame, HandshakeTiming};
pub use lifecycle::{ConnectionState, Lifecycle, Terminal};
pub use node::{BubbleCameraNode, NodeError, NodeStats};
pub use protocol::Credentials;
