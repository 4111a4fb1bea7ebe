//! Transport implementations for metrlib.
//!
//! This crate provides concrete implementations of the
//! [`Transport`](metrlib_core::Transport) trait from `metrlib-core`:
//!
//! - [`TcpTransport`]: raw SCPI sockets (port 5025, or 9760 for HS9000 units)
//! - [`SerialTransport`]: USB virtual COM ports and RS-232 links
//!
//! plus [`Resource`] for parsing instrument addresses and [`discovery`] for
//! finding Microchip-stack instruments on the LAN.
//!
//! # Example
//!
//! ```no_run
//! use metrlib_transport::Resource;
//! use std::time::Duration;
//!
//! # async fn example() -> metrlib_core::Result<()> {
//! let resource = Resource::parse("TCPIP::192.168.1.50::5025::SOCKET")?;
//! let mut transport = resource.open(Duration::from_secs(5), 115_200).await?;
//! transport.send(b"*IDN?\n").await?;
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod resource;
pub mod serial;
pub mod tcp;

pub use discovery::DiscoveredDevice;
pub use resource::Resource;
pub use serial::{DataBits, FlowControl, Parity, SerialConfig, SerialTransport, StopBits};
pub use tcp::{SCPI_RAW_PORT, TcpTransport};

use metrlib_core::error::Error;

/// Map a data-path I/O error to the appropriate [`Error`] variant.
pub(crate) fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}
