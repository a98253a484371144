//! Transport traits for receiver communication.
//!
//! A NetSDR receiver is reached over two independently lifecycled links:
//!
//! - [`ControlTransport`] -- a persistent TCP connection carrying command
//!   and response frames. Inbound frames are *pushed* to a registered
//!   [`FrameHandler`] from the transport's own read task rather than pulled
//!   by the caller.
//! - [`StreamTransport`] -- a UDP socket that, once started, runs its own
//!   receive loop for IQ sample datagrams until stopped.
//!
//! The client in `netsdr-client` operates on these traits rather than on
//! sockets directly, so the correlation engine can be driven by the real
//! tokio transports in `netsdr-transport` or by the mocks in
//! `netsdr-test-harness`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// Callback invoked once per inbound control frame.
///
/// Handlers run on whatever task delivers the frame (the TCP read loop for
/// the real transport, the sending task for mocks), so they must be cheap
/// and must not block.
pub type FrameHandler = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Callback invoked when the peer ends the connection or a read fails.
///
/// Not invoked for a local [`ControlTransport::disconnect`].
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

/// Persistent bidirectional control channel to a receiver.
#[async_trait]
pub trait ControlTransport: Send + Sync {
    /// Open the connection.
    ///
    /// On failure the transport stays closed and no frames are delivered.
    async fn connect(&self) -> Result<()>;

    /// Tear the connection down.
    ///
    /// Idempotent: safe to call when already closed or never opened.
    fn disconnect(&self);

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool;

    /// Send one complete frame.
    ///
    /// Returns [`Error::NotConnected`](crate::Error::NotConnected) when the
    /// connection is not open.
    async fn send(&self, frame: &[u8]) -> Result<()>;

    /// Register the inbound frame handler, replacing any previous one.
    fn set_frame_handler(&self, handler: FrameHandler);

    /// Register the connection-lost handler, replacing any previous one.
    fn set_close_handler(&self, handler: CloseHandler);
}

/// Continuous IQ sample receiver.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Begin receiving in the background.
    ///
    /// Returns once the receive loop is running. Calling this while
    /// already listening is a no-op.
    async fn start_listening(&self) -> Result<()>;

    /// Halt the receive loop. Synchronous and idempotent.
    fn stop_listening(&self);

    /// Whether the receive loop is running.
    fn is_listening(&self) -> bool;
}
