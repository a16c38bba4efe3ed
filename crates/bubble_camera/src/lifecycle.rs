//! Connection lifecycle: `Open -> Closed`, with a single terminal notification.

use std::fmt;

use crate::error::BubbleError;

/// Why a connection ended on its own
#[derive(Debug)]
pub enum Terminal {
    /// Connect, write, read or framing failure
    Error(BubbleError),
    /// The camera closed the socket
    Closed,
}

impl Terminal {
    pub fn is_error(&self) -> bool {
        matches!(self, Terminal::Error(_))
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::Error(e) => write!(f, "{}", e),
            Terminal::Closed => write!(f, "Bubble socket closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

/// Closed flag guarding the terminal notification
#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Open,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Record an error or close event.
    ///
    /// Returns the event only for the first transition to `Closed`; any later
    /// event, or one arriving after teardown, is swallowed.
    pub fn terminate(&mut self, terminal: Terminal) -> Option<Terminal> {
        if self.is_closed() {
            log::trace!("Ignoring event after close: {}", terminal);
            return None;
        }
        self.state = ConnectionState::Closed;
        Some(terminal)
    }

    /// Caller-initiated close. Never yields a terminal notification.
    ///
    /// Returns `true` if the connection was still open.
    pub fn teardown(&mut self) -> bool {
        let was_open = !self.is_closed();
        self.state = ConnectionState::Closed;
        was_open
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
