//! Error types for the NetSDR client.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! correlation-layer errors are all captured here.

/// The error type for all NetSDR client operations.
///
/// Variants cover the failure modes of a split control/stream receiver
/// link: connection setup, sends on a closed control channel, response
/// timeouts, dropped exchanges, and malformed frames.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error, e.g. the control connection was refused.
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (truncated header, bad length field).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The receiver answered, but not with the response the command expects.
    ///
    /// Only raised when strict response validation is enabled on the client.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Timed out connecting or waiting for a response.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to a command builder.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The control channel is not open.
    #[error("not connected")]
    NotConnected,

    /// The control connection went away while a response was outstanding.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
