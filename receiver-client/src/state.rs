use std::fmt;

/// Ready state of the socket backing a channel. Mirrors the four states of a
/// WebSocket.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConnectionState {
    /// The connection is not yet open.
    Connecting,
    /// The connection is open and ready to communicate.
    Open,
    /// The connection is in the process of closing.
    Closing,
    /// The connection is closed or couldn't be opened.
    Closed,
}

impl ConnectionState {
    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Connecting, Open)
            | (Connecting, Closed)
            | (Open, Closing)
            | (Open, Closed)
            | (Closing, Closed) => true,
            _ => false,
        }
    }

    /// A socket in this state is either open or about to be. Opening again
    /// would create a duplicate socket.
    pub fn is_active(self) -> bool {
        self == ConnectionState::Connecting || self == ConnectionState::Open
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Open => "OPEN",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Closed => "CLOSED",
        };
        write!(f, "{}", name)
    }
}
