//! Asynchronous instrument event types.
//!
//! Events are emitted by the SCPI session through a
//! [`tokio::sync::broadcast`] channel for every command sent and reply
//! received. Front ends subscribe to these for command consoles and
//! traffic logs without wrapping the instrument themselves.

/// An event emitted by an instrument session.
///
/// Subscribe via `ScpiInstrument::subscribe()` in `metrlib-scpi`. Events
/// are delivered best-effort through a bounded broadcast channel; slow
/// consumers may miss events during bulk transfers.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentEvent {
    /// A command line was written to the transport.
    CommandSent {
        /// The command text without its terminator.
        command: String,
    },

    /// A text reply was received.
    ResponseReceived {
        /// The command that produced the reply.
        command: String,
        /// The reply text without its terminator.
        response: String,
    },

    /// A binary block reply was received.
    BlockReceived {
        /// The command that produced the block.
        command: String,
        /// Payload length in bytes, excluding the header.
        len: usize,
    },

    /// An exchange failed.
    Error {
        /// The command being executed.
        command: String,
        /// Display form of the error.
        message: String,
    },

    /// The transport was closed.
    Disconnected,
}
