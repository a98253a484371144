//! netsdr-test-harness: mock transports and a scripted receiver for
//! testing the NetSDR client.
//!
//! [`MockControlTransport`] and [`MockStreamTransport`] stand in for the
//! network so client logic can be tested deterministically.
//! [`MockTcpServer`] plays the receiver side of a real TCP control
//! connection for end-to-end tests of the TCP transport.

pub mod mock_control;
pub mod mock_stream;
pub mod mock_tcp;

pub use mock_control::MockControlTransport;
pub use mock_stream::MockStreamTransport;
pub use mock_tcp::MockTcpServer;
