//! SCPI session and declarative command model for metrlib.
//!
//! This crate turns a byte-level [`Transport`](metrlib_core::Transport) into
//! an SCPI instrument. It provides:
//!
//! - **Framing** ([`protocol`]) -- terminated command lines and reply
//!   decoding, including binary blocks that contain terminator bytes.
//! - **Binary blocks** ([`block`]) -- IEEE-488.2 `#<n><len><payload>`
//!   headers and sample decoding for waveform transfers.
//! - **Session** ([`instrument`]) -- [`ScpiInstrument`], the serialized
//!   write/query/read primitives plus the IEEE-488.2 common commands.
//! - **Properties** ([`property`]) -- `const` descriptors for numeric,
//!   enumerated, boolean, text, list, and block settings, validated before
//!   any I/O.
//! - **Subsystems** ([`subsystem`]) -- command-prefix scopes, replicated
//!   per channel with 1-based indices.
//! - **Status** ([`status`]) -- the Standard Event Status Register.
//!
//! # Example
//!
//! ```
//! use metrlib_scpi::property::ValueProperty;
//! use metrlib_scpi::{ScpiConfig, ScpiInstrument};
//! use metrlib_test_harness::MockTransport;
//!
//! const FREQUENCY: ValueProperty = ValueProperty::new(":FREQ")
//!     .range(10e6, 6e9)
//!     .units("Hz")
//!     .join(":");
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> metrlib_core::Result<()> {
//! let mock = MockTransport::new();
//! mock.expect_write(":CH1:FREQ:2100000000Hz");
//!
//! let inst = ScpiInstrument::new(Box::new(mock.clone()), ScpiConfig::default());
//! let ch1 = inst.root().child(":CH", Some(1));
//! ch1.value(&FREQUENCY).set(2.1e9).await?;
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod instrument;
pub mod property;
pub mod protocol;
pub mod status;
pub mod subsystem;

pub use metrlib_core::{Error, Result};

// Re-export the primary types for ergonomic `use metrlib_scpi::*`.
pub use block::{ByteOrder, SampleFormat};
pub use instrument::{ScpiConfig, ScpiInstrument};
pub use property::{
    Access, BlockProperty, Choice, DataProperty, NumberKind, SelectProperty, SwitchFormat,
    SwitchProperty, TextProperty, ValueProperty,
};
pub use status::EventStatus;
pub use subsystem::{Built, Indexed, Scope, Subsystem};
