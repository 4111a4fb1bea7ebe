//! metrlib-test-harness: mock transports for testing metrlib drivers.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! SCPI sessions and drivers without an instrument, and [`MockTcpServer`]
//! for exercising the real socket transport against a scripted peer.

pub mod mock_tcp;
pub mod mock_transport;

pub use mock_tcp::MockTcpServer;
pub use mock_transport::MockTransport;
