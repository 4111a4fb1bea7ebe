//! metrlib-core: Core traits, types, and error definitions for metrlib.
//!
//! This crate defines the instrument-agnostic pieces every other metrlib
//! crate builds on. Applications that only need to enumerate models or
//! parse quantities depend on it without pulling in any transport or
//! driver.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`DriverRegistry`] -- model to driver/connection metadata, with templates
//! - [`InstrumentEvent`] -- command/response notifications
//! - [`si_str_to_float`] / [`format_si`] -- SI-prefix unit codec
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod registry;
pub mod transport;
pub mod types;
pub mod units;

// Re-export key types at crate root for ergonomic `use metrlib_core::*`.
pub use error::{AccessKind, Error, Result};
pub use events::InstrumentEvent;
pub use registry::{
    Discovery, DiscoveryProtocol, DriverEntry, DriverInfo, DriverRegistry, NO_DRIVER_MODULE,
};
pub use transport::Transport;
pub use types::*;
pub use units::{format_si, parse_quantity, si_str_to_float};
