//! Transport implementations for the NetSDR client.
//!
//! This crate provides concrete implementations of the transport traits
//! from `netsdr-core`:
//!
//! - [`TcpControlTransport`]: the TCP control channel, with a background
//!   read loop that splits the byte stream into NetSDR messages and pushes
//!   each one to the registered frame handler
//! - [`UdpStreamTransport`]: the UDP IQ data channel, with a cancellable
//!   receive loop feeding a bounded datagram channel
//!
//! # Example
//!
//! ```no_run
//! use netsdr_core::{ControlTransport, StreamTransport};
//! use netsdr_transport::{TcpControlTransport, UdpStreamTransport};
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let control = TcpControlTransport::new("192.168.1.50:50000");
//! control.connect().await?;
//!
//! let (stream, _datagrams) = UdpStreamTransport::new("0.0.0.0:60000", 256);
//! stream.start_listening().await?;
//! # Ok(())
//! # }
//! ```

pub mod tcp;
pub mod udp;

pub use tcp::TcpControlTransport;
pub use udp::UdpStreamTransport;
