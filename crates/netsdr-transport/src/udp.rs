//! UDP stream transport for IQ sample data.
//!
//! This module provides [`UdpStreamTransport`], which implements the
//! [`StreamTransport`] trait. Once started it binds the data port (UDP
//! 60000 by default) and runs a receive loop in a background task,
//! forwarding every datagram as [`Bytes`] into a bounded channel until
//! [`stop_listening`](StreamTransport::stop_listening) is called.
//!
//! The loop never blocks on the consumer: if the channel is full the
//! datagram is dropped.
//!
//! Stopping aborts the receive task without waiting for it. A following
//! start waits for that task to finish first, so the old socket is closed
//! before the port is bound again.
//!
//! # Example
//!
//! ```no_run
//! use netsdr_core::StreamTransport;
//! use netsdr_transport::UdpStreamTransport;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let (transport, mut datagrams) = UdpStreamTransport::new("0.0.0.0:60000", 64);
//! transport.start_listening().await?;
//!
//! while let Some(datagram) = datagrams.recv().await {
//!     println!("{} bytes", datagram.len());
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use netsdr_core::error::{Error, Result};
use netsdr_core::transport::StreamTransport;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Receive buffer size. Larger than the biggest NetSDR data item (8194).
const RECV_BUFFER_SIZE: usize = 16 * 1024;

struct Listener {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// UDP implementation of [`StreamTransport`].
pub struct UdpStreamTransport {
    bind_addr: String,
    datagram_tx: mpsc::Sender<Bytes>,
    listener: Mutex<Option<Listener>>,
    /// Receive task of the last stopped listener, possibly still unwinding.
    retired: Mutex<Option<JoinHandle<()>>>,
}

impl UdpStreamTransport {
    /// Create a transport bound to `bind_addr` when started, together with
    /// the receiving end of its datagram channel.
    pub fn new(bind_addr: &str, capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::with_sender(bind_addr, tx), rx)
    }

    /// Create a transport that forwards datagrams into an existing channel.
    pub fn with_sender(bind_addr: &str, datagram_tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            bind_addr: bind_addr.to_string(),
            datagram_tx,
            listener: Mutex::new(None),
            retired: Mutex::new(None),
        }
    }

    /// The locally bound address while listening.
    ///
    /// Useful when binding to port 0 to discover the assigned port.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.listener).as_ref().map(|l| l.local_addr)
    }
}

#[async_trait]
impl StreamTransport for UdpStreamTransport {
    async fn start_listening(&self) -> Result<()> {
        if self.is_listening() {
            tracing::trace!(addr = %self.bind_addr, "UDP receiver already running");
            return Ok(());
        }

        let retired = lock(&self.retired).take();
        if let Some(handle) = retired {
            // Cancelled or aborted; either way the socket is released.
            let _ = handle.await;
        }

        let socket = UdpSocket::bind(&self.bind_addr).await.map_err(|e| {
            tracing::error!(addr = %self.bind_addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;
        let local_addr = socket.local_addr().map_err(|e| {
            tracing::error!(error = %e, "Failed to get local address");
            Error::Io(e)
        })?;

        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            let tx = self.datagram_tx.clone();
            tokio::spawn(async move {
                recv_loop(socket, tx, cancel).await;
            })
        };

        let previous = lock(&self.listener).replace(Listener {
            cancel,
            handle,
            local_addr,
        });
        if let Some(stale) = previous {
            stale.cancel.cancel();
            stale.handle.abort();
        }

        tracing::debug!(local_addr = %local_addr, "UDP IQ receiver started");
        Ok(())
    }

    fn stop_listening(&self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.cancel.cancel();
            listener.handle.abort();
            *lock(&self.retired) = Some(listener.handle);
            tracing::debug!(local_addr = %listener.local_addr, "UDP IQ receiver stopped");
        }
    }

    fn is_listening(&self) -> bool {
        lock(&self.listener)
            .as_ref()
            .is_some_and(|l| !l.handle.is_finished())
    }
}

impl Drop for UdpStreamTransport {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.cancel.cancel();
            listener.handle.abort();
        }
    }
}

/// Background task that receives datagrams until cancelled.
async fn recv_loop(socket: UdpSocket, tx: mpsc::Sender<Bytes>, cancel: CancellationToken) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok((n, src)) => {
                    tracing::trace!(remote = %src, bytes = n, "Received datagram");
                    match tx.try_send(Bytes::copy_from_slice(&buf[..n])) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::trace!("IQ datagram dropped (consumer too slow)");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            tracing::debug!("IQ datagram consumer gone, stopping receiver");
                            break;
                        }
                    }
                }
                Err(e) => {
                    // Non-fatal for UDP.
                    tracing::trace!(error = %e, "UDP recv error");
                }
            },
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
