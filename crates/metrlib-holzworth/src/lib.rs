//! Holzworth HS9000-series synthesizer backend for metrlib.
//!
//! The HS9000 family are multi-channel phase-coherent RF synthesizers
//! (10 MHz to 6 GHz) reachable over LAN (raw socket on port 9760), USB
//! serial, or VISA. This crate provides:
//!
//! - **Model definitions** ([`models`]) -- HS9001B through HS9008B, which
//!   differ only in channel count.
//! - **Synthesizer driver** ([`synth`]) -- [`Hs9000`] with its channel,
//!   reference, IP, communication, and diagnostics subsystems.
//! - **Builder** ([`builder`]) -- [`Hs9000Builder`] for TCP, serial, or a
//!   caller-provided transport.
//!
//! # Command syntax
//!
//! Unlike most SCPI instruments, the HS9000 separates the argument from the
//! header with a colon and keeps the unit attached:
//!
//! ```text
//! :CH1:FREQ:2105000000Hz
//! :CH1:PWR:-5dBm
//! :CH1:PWR:RF:ON
//! :REF:EXT:10MHz
//! ```
//!
//! With `read_after_write` the unit is put into respond mode
//! (`:COMM:RESPOND:ON`) and every write reads back one acknowledgement.
//!
//! # Example
//!
//! ```
//! use metrlib_holzworth::{Hs9000Builder, models::hs9002b};
//! use metrlib_test_harness::MockTransport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> metrlib_core::Result<()> {
//! let mock = MockTransport::new();
//! mock.expect_write(":CH2:FREQ:2105000000Hz");
//!
//! let synth = Hs9000Builder::new(hs9002b())
//!     .build_with_transport(Box::new(mock.clone()))
//!     .await?;
//! synth.channel(2)?.frequency().set_str("2105MHz").await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod models;
pub mod synth;

// Re-export the primary types for ergonomic `use metrlib_holzworth::*`.
pub use builder::Hs9000Builder;
pub use models::{HS9000_SOCKET_PORT, Hs9000Model};
pub use synth::{
    Channel, Communication, Diagnostics, Hs9000, Ip, IpMode, PowerMode, Reference,
    ReferenceSource,
};
