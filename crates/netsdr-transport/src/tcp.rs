//! TCP control transport.
//!
//! This module provides [`TcpControlTransport`], which implements the
//! [`ControlTransport`] trait for the NetSDR control port (TCP 50000 by
//! default).
//!
//! Outbound frames are written whole through the write half of the socket.
//! Inbound bytes are read by a background task, reassembled into complete
//! NetSDR messages using the length field of the header, and handed to the
//! registered [`FrameHandler`] one message at a time. When the receiver
//! closes the socket or a read fails, the registered [`CloseHandler`] runs
//! once after the transport has marked itself disconnected.
//!
//! # Example
//!
//! ```no_run
//! use netsdr_core::ControlTransport;
//! use netsdr_transport::TcpControlTransport;
//! use std::sync::Arc;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let transport = TcpControlTransport::new("192.168.1.50:50000");
//! transport.set_frame_handler(Arc::new(|frame: Vec<u8>| {
//!     println!("received {:02X?}", frame);
//! }));
//! transport.connect().await?;
//!
//! // Request the receiver state (control item 0x0018).
//! transport.send(&[0x04, 0x20, 0x18, 0x00]).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::BytesMut;
use netsdr_core::error::{Error, Result};
use netsdr_core::frame;
use netsdr_core::transport::{CloseHandler, ControlTransport, FrameHandler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Initial capacity of the reassembly buffer.
const READ_BUFFER_SIZE: usize = 4096;

type SharedHandler = Arc<Mutex<Option<FrameHandler>>>;
type SharedCloseHandler = Arc<Mutex<Option<CloseHandler>>>;

/// State that exists only while the socket is open.
struct Connection {
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    reader: JoinHandle<()>,
    /// Cleared by the read loop when the peer closes or a read fails.
    open: Arc<AtomicBool>,
}

/// TCP implementation of [`ControlTransport`].
///
/// Created disconnected; [`connect`](ControlTransport::connect) opens the
/// socket and starts the read loop. All methods take `&self`, so the
/// transport can be shared behind an `Arc` between the client and its
/// callers.
pub struct TcpControlTransport {
    /// `host:port` of the receiver's control port.
    addr: String,
    connect_timeout: Duration,
    connection: Mutex<Option<Connection>>,
    handler: SharedHandler,
    close_handler: SharedCloseHandler,
}

impl TcpControlTransport {
    /// Create a transport for `addr` using the default connect timeout.
    pub fn new(addr: &str) -> Self {
        Self::with_timeout(addr, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a transport for `addr` with a specified connect timeout.
    pub fn with_timeout(addr: &str, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.to_string(),
            connect_timeout,
            connection: Mutex::new(None),
            handler: Arc::new(Mutex::new(None)),
            close_handler: Arc::new(Mutex::new(None)),
        }
    }

    /// Get the address string this transport connects to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn writer(&self) -> Result<Arc<tokio::sync::Mutex<OwnedWriteHalf>>> {
        let guard = lock(&self.connection);
        match guard.as_ref() {
            Some(conn) if conn.open.load(Ordering::SeqCst) => Ok(Arc::clone(&conn.writer)),
            _ => Err(Error::NotConnected),
        }
    }
}

#[async_trait]
impl ControlTransport for TcpControlTransport {
    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        tracing::debug!(
            addr = %self.addr,
            timeout_ms = self.connect_timeout.as_millis(),
            "Connecting to receiver control port"
        );

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %self.addr, "TCP connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::error!(addr = %self.addr, error = %e, "TCP connection failed");
                map_connect_error(e, &self.addr)
            })?;

        // Control frames are a handful of bytes each.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %self.addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        let (read_half, write_half) = stream.into_split();
        let open = Arc::new(AtomicBool::new(true));

        let reader = {
            let handler = Arc::clone(&self.handler);
            let on_close = Arc::clone(&self.close_handler);
            let open = Arc::clone(&open);
            let addr = self.addr.clone();
            tokio::spawn(async move {
                read_loop(read_half, handler, open, addr).await;
                let current = lock(&on_close).clone();
                if let Some(h) = current {
                    h();
                }
            })
        };

        let previous = lock(&self.connection).replace(Connection {
            writer: Arc::new(tokio::sync::Mutex::new(write_half)),
            reader,
            open,
        });
        if let Some(stale) = previous {
            stale.reader.abort();
        }

        tracing::info!(addr = %self.addr, "TCP control connection established");
        Ok(())
    }

    fn disconnect(&self) {
        let taken = lock(&self.connection).take();
        match taken {
            Some(conn) => {
                tracing::debug!(addr = %self.addr, "Closing TCP control connection");
                conn.open.store(false, Ordering::SeqCst);
                conn.reader.abort();
                // The write half shuts the socket down once the last
                // in-flight send releases it.
                drop(conn.writer);
                tracing::info!(addr = %self.addr, "TCP control connection closed");
            }
            None => {
                tracing::trace!(addr = %self.addr, "Disconnect on closed transport");
            }
        }
    }

    fn is_connected(&self) -> bool {
        lock(&self.connection)
            .as_ref()
            .is_some_and(|conn| conn.open.load(Ordering::SeqCst))
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        let writer = self.writer()?;
        let mut w = writer.lock().await;

        tracing::trace!(
            addr = %self.addr,
            bytes = data.len(),
            data = ?data,
            "Sending frame"
        );

        w.write_all(data).await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to send frame");
            map_io_error(e)
        })?;

        w.flush().await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to flush TCP stream");
            map_io_error(e)
        })?;

        Ok(())
    }

    fn set_frame_handler(&self, handler: FrameHandler) {
        *lock(&self.handler) = Some(handler);
    }

    fn set_close_handler(&self, handler: CloseHandler) {
        *lock(&self.close_handler) = Some(handler);
    }
}

impl Drop for TcpControlTransport {
    fn drop(&mut self) {
        if let Some(conn) = lock(&self.connection).take() {
            tracing::debug!(addr = %self.addr, "TcpControlTransport dropped, closing connection");
            conn.reader.abort();
        }
    }
}

/// Background task: reassemble messages from the byte stream and dispatch
/// each one to the registered handler.
async fn read_loop(
    mut reader: OwnedReadHalf,
    handler: SharedHandler,
    open: Arc<AtomicBool>,
    addr: String,
) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                tracing::warn!(addr = %addr, "Receiver closed control connection");
                break;
            }
            Ok(n) => {
                tracing::trace!(addr = %addr, bytes = n, "Received data");
                loop {
                    match frame::next_frame_len(&buf) {
                        Ok(Some(len)) => {
                            let message = buf.split_to(len).to_vec();
                            dispatch(&handler, message);
                        }
                        Ok(None) => break,
                        Err(e) => {
                            // No way to resynchronise inside a corrupt stream.
                            tracing::warn!(
                                addr = %addr,
                                error = %e,
                                discarded = buf.len(),
                                "Discarding unframeable control data"
                            );
                            buf.clear();
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(addr = %addr, error = %e, "TCP read error");
                break;
            }
        }
    }

    open.store(false, Ordering::SeqCst);
}

fn dispatch(handler: &SharedHandler, message: Vec<u8>) {
    let current = lock(handler).clone();
    match current {
        Some(h) => h(message),
        None => tracing::trace!(frame = ?message, "No frame handler registered, dropping"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}
