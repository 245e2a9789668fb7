use std::fmt;

/// Lifecycle of the station link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket; either idle or waiting for the reconnect timer
    #[default]
    Disconnected,
    /// Handshake in flight
    Connecting,
    /// Socket open, frames flowing
    Connected,
}

impl ConnectionState {
    /// Whether moving to `next` is a legal transition
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting) | (Connecting, Connected) | (Connecting, Disconnected) | (Connected, Disconnected)
        )
    }

    /// Whether outbound commands may be written
    pub fn accepts_commands(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        };
        f.write_str(name)
    }
}
