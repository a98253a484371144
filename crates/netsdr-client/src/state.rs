//! Client connection/streaming state.

use std::fmt;

/// Combined view of the control connection and the IQ stream.
///
/// Derived on demand from the control transport's connection flag and the
/// client's IQ flag. A stream left marked as started on a closed connection
/// reports [`ClientState::Disconnected`], so `Streaming` always implies an
/// open control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    ConnectedIdle,
    Streaming,
}

impl ClientState {
    pub fn from_flags(connected: bool, iq_started: bool) -> Self {
        match (connected, iq_started) {
            (false, _) => ClientState::Disconnected,
            (true, false) => ClientState::ConnectedIdle,
            (true, true) => ClientState::Streaming,
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientState::Disconnected => "disconnected",
            ClientState::ConnectedIdle => "connected",
            ClientState::Streaming => "streaming",
        };
        f.write_str(s)
    }
}
