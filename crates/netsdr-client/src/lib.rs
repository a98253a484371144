//! NetSDR receiver client.
//!
//! This crate drives an RFSpace NetSDR-compatible software-defined receiver
//! over its TCP control channel and receives the IQ sample stream on UDP.
//! It provides:
//!
//! - **SdrClient** ([`client`]) -- connection setup, IQ stream start/stop
//!   and retuning, with strict one-at-a-time command/response correlation.
//! - **Codec** ([`codec`]) -- control item encoding and inbound message
//!   classification.
//! - **IQ samples** ([`samples`]) -- parsing of UDP data items and sequence
//!   gap tracking.
//! - **SdrClientBuilder** ([`builder`]) -- fluent builder wiring the client
//!   to the TCP and UDP transports.
//!
//! # Architecture
//!
//! The client owns no sockets. It talks through the
//! [`ControlTransport`](netsdr_core::ControlTransport) and
//! [`StreamTransport`](netsdr_core::StreamTransport) traits, so the same
//! logic runs over the real transports from `netsdr-transport` or over the
//! mocks in `netsdr-test-harness`.
//!
//! # Example
//!
//! ```no_run
//! use netsdr_client::SdrClientBuilder;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let (client, _iq) = SdrClientBuilder::new()
//!     .host("192.168.1.50")
//!     .connect()
//!     .await?;
//! client.change_frequency(7_074_000, 0).await?;
//! client.start_iq().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod codec;
pub mod samples;
pub mod state;

pub use builder::SdrClientBuilder;
pub use client::{ClientOptions, SdrClient};
pub use samples::{IqPacket, IqReceiver, IqSample};
pub use state::ClientState;
