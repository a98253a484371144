//! SdrClientBuilder -- fluent builder for constructing [`SdrClient`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! network parameters and behavior flags before the TCP control
//! connection is opened.
//!
//! # Example
//!
//! ```no_run
//! use netsdr_client::SdrClientBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let (client, mut iq) = SdrClientBuilder::new()
//!     .host("192.168.1.50")
//!     .response_timeout(Duration::from_secs(2))
//!     .connect()
//!     .await?;
//!
//! client.start_iq().await?;
//! if let Some(Ok(packet)) = iq.recv().await {
//!     println!("{} samples", packet.samples.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::{ControlTransport, StreamTransport};
use netsdr_transport::{TcpControlTransport, UdpStreamTransport};

use crate::client::{ClientOptions, SdrClient};
use crate::codec::DEFAULT_SAMPLE_RATE_HZ;
use crate::samples::IqReceiver;

/// Default NetSDR TCP control port.
const DEFAULT_TCP_PORT: u16 = 50000;

/// Default UDP port the IQ stream is received on.
const DEFAULT_UDP_PORT: u16 = 60000;

/// Default local address for the IQ socket.
const DEFAULT_UDP_BIND_HOST: &str = "0.0.0.0";

/// Default TCP connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Datagrams buffered between the UDP socket and the [`IqReceiver`].
const DEFAULT_SAMPLE_CHANNEL_CAPACITY: usize = 256;

/// Fluent builder for [`SdrClient`].
///
/// Only the host is required:
///
/// ```ignore
/// let (client, iq) = SdrClientBuilder::new().host("192.168.1.50").build()?;
/// ```
pub struct SdrClientBuilder {
    host: Option<String>,
    tcp_port: u16,
    udp_port: u16,
    udp_bind_host: String,
    sample_rate_hz: u32,
    connect_timeout: Duration,
    response_timeout: Option<Duration>,
    validate_responses: bool,
    sample_channel_capacity: usize,
}

impl SdrClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        SdrClientBuilder {
            host: None,
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            udp_bind_host: DEFAULT_UDP_BIND_HOST.to_string(),
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: None,
            validate_responses: false,
            sample_channel_capacity: DEFAULT_SAMPLE_CHANNEL_CAPACITY,
        }
    }

    /// Set the receiver's IP address or hostname.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Set the TCP control port (default: 50000).
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = port;
        self
    }

    /// Set the local UDP port for IQ data (default: 60000).
    pub fn udp_port(mut self, port: u16) -> Self {
        self.udp_port = port;
        self
    }

    /// Set the local address the IQ socket binds to (default: "0.0.0.0").
    pub fn udp_bind_host(mut self, host: &str) -> Self {
        self.udp_bind_host = host.to_string();
        self
    }

    /// Set the IQ output sample rate sent on connect (default: 100000 Hz).
    pub fn sample_rate(mut self, hz: u32) -> Self {
        self.sample_rate_hz = hz;
        self
    }

    /// Set the TCP connect timeout (default: 5s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Give up on a command after `timeout` instead of waiting forever.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Reject NAKs and responses for the wrong control item (default: off).
    pub fn validate_responses(mut self, enable: bool) -> Self {
        self.validate_responses = enable;
        self
    }

    /// Set how many IQ datagrams may queue before new ones are dropped
    /// (default: 256).
    pub fn sample_channel_capacity(mut self, capacity: usize) -> Self {
        self.sample_channel_capacity = capacity;
        self
    }

    /// Build a client over the TCP and UDP transports.
    ///
    /// Requires that [`host()`](Self::host) has been called. Nothing is
    /// opened yet: call [`SdrClient::connect`] on the result.
    pub fn build(self) -> Result<(SdrClient, IqReceiver)> {
        let host = self.host.as_ref().ok_or_else(|| {
            Error::InvalidParameter("host is required: call .host() before .build()".into())
        })?;
        if self.sample_channel_capacity == 0 {
            return Err(Error::InvalidParameter(
                "sample channel capacity must be at least 1".into(),
            ));
        }

        let control_addr = format!("{}:{}", host, self.tcp_port);
        let control = TcpControlTransport::with_timeout(&control_addr, self.connect_timeout);

        let bind_addr = format!("{}:{}", self.udp_bind_host, self.udp_port);
        let (stream, datagrams) =
            UdpStreamTransport::new(&bind_addr, self.sample_channel_capacity);

        tracing::debug!(
            control = %control_addr,
            iq = %bind_addr,
            "Building NetSDR client"
        );

        let client = self.build_with_transports(Arc::new(control), Arc::new(stream));
        Ok((client, IqReceiver::new(datagrams)))
    }

    /// Build, then open the control connection and initialize the receiver.
    pub async fn connect(self) -> Result<(SdrClient, IqReceiver)> {
        let (client, iq) = self.build()?;
        client.connect().await?;
        Ok((client, iq))
    }

    /// Build a client over caller-supplied transports.
    ///
    /// This is the entry point for testing with mock transports.
    pub fn build_with_transports(
        &self,
        control: Arc<dyn ControlTransport>,
        stream: Arc<dyn StreamTransport>,
    ) -> SdrClient {
        SdrClient::with_options(control, stream, self.options())
    }

    fn options(&self) -> ClientOptions {
        ClientOptions {
            sample_rate_hz: self.sample_rate_hz,
            response_timeout: self.response_timeout,
            validate_responses: self.validate_responses,
        }
    }
}

impl Default for SdrClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ClientState;
    use bytes::Bytes;
    use netsdr_test_harness::{MockControlTransport, MockStreamTransport, MockTcpServer};
    use tokio::net::UdpSocket;

    #[test]
    fn test_builder_defaults() {
        let builder = SdrClientBuilder::new();
        assert!(builder.host.is_none());
        assert_eq!(builder.tcp_port, 50000);
        assert_eq!(builder.udp_port, 60000);
        assert_eq!(builder.udp_bind_host, "0.0.0.0");
        assert_eq!(builder.sample_rate_hz, 100_000);
        assert_eq!(builder.connect_timeout, Duration::from_secs(5));
        assert!(builder.response_timeout.is_none());
        assert!(!builder.validate_responses);
        assert_eq!(builder.sample_channel_capacity, 256);
    }

    #[test]
    fn test_builder_custom_settings() {
        let builder = SdrClientBuilder::new()
            .host("10.0.0.42")
            .tcp_port(50001)
            .udp_port(60001)
            .udp_bind_host("10.0.0.2")
            .sample_rate(1_000_000)
            .connect_timeout(Duration::from_millis(500))
            .response_timeout(Duration::from_secs(1))
            .validate_responses(true)
            .sample_channel_capacity(16);

        assert_eq!(builder.host.as_deref(), Some("10.0.0.42"));
        assert_eq!(builder.tcp_port, 50001);
        assert_eq!(builder.udp_port, 60001);
        assert_eq!(builder.udp_bind_host, "10.0.0.2");
        assert_eq!(builder.connect_timeout, Duration::from_millis(500));

        let options = builder.options();
        assert_eq!(options.sample_rate_hz, 1_000_000);
        assert_eq!(options.response_timeout, Some(Duration::from_secs(1)));
        assert!(options.validate_responses);
        assert_eq!(builder.sample_channel_capacity, 16);
    }

    #[test]
    fn test_builder_requires_host() {
        let result = SdrClientBuilder::new().build();
        match result {
            Err(Error::InvalidParameter(msg)) => assert!(msg.contains("host")),
            Err(other) => panic!("expected InvalidParameter, got {:?}", other),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_builder_rejects_zero_capacity() {
        let result = SdrClientBuilder::new()
            .host("127.0.0.1")
            .sample_channel_capacity(0)
            .build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn test_build_does_not_connect() {
        let (client, _iq) = SdrClientBuilder::new()
            .host("127.0.0.1")
            .udp_port(0)
            .build()
            .unwrap();
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn test_build_with_transports_uses_options() {
        let control = Arc::new(MockControlTransport::with_auto_response(&[0x02, 0x00]));
        let client = SdrClientBuilder::new()
            .sample_rate(48_000)
            .build_with_transports(control.clone(), Arc::new(MockStreamTransport::new()));

        client.connect().await.unwrap();

        // 48000 = 0x0000BB80
        assert_eq!(
            control.sent_frames()[0],
            vec![0x09, 0x00, 0xB8, 0x00, 0x00, 0x80, 0xBB, 0x00, 0x00]
        );
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = SdrClientBuilder::new()
            .host("127.0.0.1")
            .tcp_port(port)
            .udp_port(0)
            .connect()
            .await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_iq_samples_end_to_end() {
        let start_iq = [0x08, 0x00, 0x18, 0x00, 0x80, 0x02, 0x01, 0x01];
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(&start_iq, &start_iq);
        server.start();

        let (udp, datagrams) = UdpStreamTransport::new("127.0.0.1:0", 8);
        let udp = Arc::new(udp);
        let control = Arc::new(TcpControlTransport::new(server.addr()));
        control.connect().await.unwrap();

        let client = SdrClientBuilder::new()
            .validate_responses(true)
            .response_timeout(Duration::from_secs(2))
            .build_with_transports(control, udp.clone());
        let mut iq = IqReceiver::new(datagrams);

        client.start_iq().await.unwrap();
        let target = udp.local_addr().unwrap();

        // header (DataItem0, 8 bytes), sequence 0, one sample (I=1, Q=-2)
        let packet = Bytes::from_static(&[0x08, 0x80, 0x00, 0x00, 0x01, 0x00, 0xFE, 0xFF]);
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&packet, target).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), iq.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(received.sequence, 0);
        assert_eq!(received.samples.len(), 1);
        assert_eq!(received.samples[0].i, 1);
        assert_eq!(received.samples[0].q, -2);

        client.disconnect();
        server.wait().await.unwrap();
    }
}
