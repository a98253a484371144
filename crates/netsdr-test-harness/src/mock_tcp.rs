//! Mock TCP receiver for protocol-level testing.
//!
//! [`MockTcpServer`] is a TCP listener pre-loaded with scripted control
//! exchanges, enabling deterministic end-to-end tests of the TCP control
//! transport and the client without a real receiver.
//!
//! # Example
//!
//! ```
//! use netsdr_test_harness::MockTcpServer;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//!
//! // Echo the start command back as the acknowledgement.
//! let start = [0x08, 0x00, 0x18, 0x00, 0x80, 0x02, 0x01, 0x01];
//! server.expect(&start, &start);
//!
//! let addr = server.addr().to_string();
//! server.start();
//! // ... connect a TcpControlTransport to addr ...
//! # Ok(())
//! # }
//! ```

use netsdr_core::error::{Error, Result};
use std::collections::VecDeque;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A scripted request/response pair.
#[derive(Debug, Clone)]
struct TcpExpectation {
    /// The exact bytes we expect the client to send.
    request: Vec<u8>,
    /// Written back once the request has been matched. May be empty.
    response: Vec<u8>,
}

/// A mock NetSDR control endpoint.
///
/// Listens on a random port on localhost. Once started it accepts a single
/// connection and walks the expectations in order. After the last one it
/// keeps the connection open until the client closes it, so a client under
/// test does not observe a spurious remote close.
///
/// A request that does not match the next expectation ends the session
/// with an error reported by [`wait`](MockTcpServer::wait).
pub struct MockTcpServer {
    addr: String,
    listener: Option<TcpListener>,
    expectations: VecDeque<TcpExpectation>,
    unsolicited: Vec<u8>,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind a new mock server on a random port.
    ///
    /// The listener is bound immediately, so a client may connect as soon
    /// as this returns; the connection is accepted once
    /// [`start`](MockTcpServer::start) is called.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            expectations: VecDeque::new(),
            unsolicited: Vec::new(),
            server_handle: None,
        })
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(TcpExpectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Bytes written to the client right after it connects, before any
    /// expectation is processed.
    pub fn send_on_connect(&mut self, data: &[u8]) {
        self.unsolicited.extend_from_slice(data);
    }

    /// The address the server is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Start serving in a background task.
    ///
    /// Calling this twice has no effect.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let expectations: Vec<TcpExpectation> = self.expectations.drain(..).collect();
        let unsolicited = std::mem::take(&mut self.unsolicited);

        let handle = tokio::spawn(async move {
            let (mut stream, peer) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;
            tracing::debug!(%peer, "Mock receiver accepted connection");

            if !unsolicited.is_empty() {
                write_all(&mut stream, &unsolicited, "unsolicited").await?;
            }

            for (i, expectation) in expectations.iter().enumerate() {
                let mut buf = vec![0u8; expectation.request.len()];
                let mut total_read = 0;

                while total_read < buf.len() {
                    let n = stream
                        .read(&mut buf[total_read..])
                        .await
                        .map_err(|e| format!("expectation {}: read error: {}", i, e))?;
                    if n == 0 {
                        return Err(format!(
                            "expectation {}: client disconnected after {} bytes (expected {})",
                            i,
                            total_read,
                            buf.len()
                        ));
                    }
                    total_read += n;
                }

                if buf != expectation.request {
                    return Err(format!(
                        "expectation {}: request mismatch: expected {:02X?}, got {:02X?}",
                        i, expectation.request, buf
                    ));
                }

                if !expectation.response.is_empty() {
                    write_all(&mut stream, &expectation.response, &i.to_string()).await?;
                }
            }

            // Drain until the client hangs up. Anything sent past the script
            // is a test failure.
            let mut extra = [0u8; 64];
            match stream.read(&mut extra).await {
                Ok(0) | Err(_) => Ok(()),
                Ok(n) => Err(format!(
                    "unexpected request after script: {:02X?}",
                    &extra[..n]
                )),
            }
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the session to end and return any script violation.
    ///
    /// The session ends when the client disconnects, so call this after
    /// closing the client side.
    pub async fn wait(self) -> std::result::Result<(), String> {
        if let Some(handle) = self.server_handle {
            handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?
        } else {
            Ok(())
        }
    }
}

async fn write_all(
    stream: &mut TcpStream,
    data: &[u8],
    label: &str,
) -> std::result::Result<(), String> {
    stream
        .write_all(data)
        .await
        .map_err(|e| format!("expectation {}: write error: {}", label, e))?;
    stream
        .flush()
        .await
        .map_err(|e| format!("expectation {}: flush error: {}", label, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_exchange() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(&[0x04, 0x20, 0x18, 0x00], &[0x02, 0x00]);
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        client.write_all(&[0x04, 0x20, 0x18, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x02, 0x00]);

        drop(client);
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn mismatch_is_reported() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(&[0x01, 0x02], &[]);
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        client.write_all(&[0x01, 0x03]).await.unwrap();

        let err = server.wait().await.unwrap_err();
        assert!(err.contains("request mismatch"), "{}", err);
    }

    #[tokio::test]
    async fn extra_request_is_reported() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        client.write_all(&[0x02, 0x00]).await.unwrap();

        let err = server.wait().await.unwrap_err();
        assert!(err.contains("unexpected request"), "{}", err);
    }

    #[tokio::test]
    async fn unsolicited_bytes_arrive_first() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.send_on_connect(&[0x02, 0x00]);
        server.start();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x02, 0x00]);

        drop(client);
        server.wait().await.unwrap();
    }
}
