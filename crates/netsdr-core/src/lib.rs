//! netsdr-core: Core traits, frame header, and error definitions for the
//! NetSDR client.
//!
//! This crate defines the transport-agnostic abstractions the client is
//! written against. Transports and test doubles depend on these types
//! without pulling in the correlation engine.
//!
//! # Key types
//!
//! - [`ControlTransport`] -- command/response channel with push delivery
//! - [`StreamTransport`] -- continuous IQ datagram receiver
//! - [`frame`] -- the 16-bit NetSDR message header
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod frame;
pub mod transport;

pub use error::{Error, Result};
pub use frame::{FrameHeader, MessageType};
pub use transport::{CloseHandler, ControlTransport, FrameHandler, StreamTransport};
