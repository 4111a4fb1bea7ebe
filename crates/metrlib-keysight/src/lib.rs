//! Keysight InfiniiVision oscilloscope backend for metrlib.
//!
//! This crate provides:
//!
//! - **Model definitions** ([`models`]) -- the DSOX1204G.
//! - **Oscilloscope driver** ([`scope`]) -- [`Dsox1204g`] with acquire,
//!   channel, timebase, trigger, waveform-generator, and waveform
//!   subsystems plus run control and trace capture.
//! - **Waveform transfer** ([`waveform`]) -- preamble parsing, the time axis,
//!   and conversion of BYTE/WORD/ASCii data to volts.
//! - **Builder** ([`builder`]) -- [`Dsox1204gBuilder`] for TCP or a
//!   caller-provided transport.
//!
//! # Example
//!
//! ```
//! use metrlib_keysight::{Dsox1204gBuilder, models::dsox1204g};
//! use metrlib_keysight::scope::TriggerSlope;
//! use metrlib_test_harness::MockTransport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> metrlib_core::Result<()> {
//! let mock = MockTransport::new();
//! mock.expect_write(":TRIGger:SLOPe POSitive");
//! mock.expect_write(":TIMebase:SCALe 0.0005s");
//!
//! let scope = Dsox1204gBuilder::new(dsox1204g())
//!     .build_with_transport(Box::new(mock.clone()))
//!     .await?;
//! scope.trigger().slope().set(TriggerSlope::Positive).await?;
//! scope.timebase().scale().set_str("500us").await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod models;
pub mod scope;
pub mod waveform;

// Re-export the primary types for ergonomic `use metrlib_keysight::*`.
pub use builder::Dsox1204gBuilder;
pub use models::ScopeModel;
pub use scope::{Acquire, Channel, Dsox1204g, Timebase, Trace, Trigger, WaveGen};
pub use waveform::{Preamble, PreamblePolicy, TimeAxis, Waveform, WaveformFormat, WaveformSource};
