//! Error types for metrlib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Validation failures, transport and
//! framing failures, reply parse failures, and registry lookup failures are
//! all captured here.

use std::fmt;

/// The error type for all metrlib operations.
///
/// Validation variants ([`Range`](Error::Range),
/// [`InvalidChoice`](Error::InvalidChoice), [`AccessDenied`](Error::AccessDenied))
/// are always returned before any bytes reach the instrument.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port, TCP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed reply framing, e.g. a bad IEEE-488.2 block header.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A reply could not be coerced to the expected type.
    #[error("parse error: {0}")]
    Parse(String),

    /// Timed out waiting for a reply from the instrument.
    ///
    /// This typically indicates the instrument is powered off, the command
    /// was a write that produces no reply, or the line terminator is wrong.
    #[error("timeout waiting for response")]
    Timeout,

    /// A numeric value fell outside a property's declared bounds.
    #[error("value {value} outside range [{min}, {max}]")]
    Range {
        /// The rejected value.
        value: f64,
        /// Lower bound (inclusive).
        min: f64,
        /// Upper bound (inclusive).
        max: f64,
    },

    /// A value did not match (or ambiguously matched) a property's choices.
    #[error("invalid choice '{value}', expected one of: {}", .choices.join(", "))]
    InvalidChoice {
        /// The rejected input.
        value: String,
        /// The legal SCPI tokens.
        choices: Vec<String>,
    },

    /// A read of a write-only property, or a write of a read-only one.
    #[error("property '{command}' is {access}")]
    AccessDenied {
        /// The full command path of the property.
        command: String,
        /// The property's declared access mode.
        access: AccessKind,
    },

    /// No driver is registered under this model string.
    #[error("no driver registered for model: {0}")]
    UnknownModel(String),

    /// A registry entry references a template that is absent or cyclic.
    #[error("invalid template reference: {0}")]
    UnknownTemplate(String),

    /// The requested operation is not supported by this instrument or build.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An invalid parameter or configuration value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the instrument has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the instrument was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The access restriction reported by [`Error::AccessDenied`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// The property can only be queried.
    ReadOnly,
    /// The property can only be written.
    WriteOnly,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::ReadOnly => write!(f, "read-only"),
            AccessKind::WriteOnly => write!(f, "write-only"),
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("missing '#' in block header".into());
        assert_eq!(e.to_string(), "protocol error: missing '#' in block header");
    }

    #[test]
    fn error_display_parse() {
        let e = Error::Parse("'abc' is not a number".into());
        assert_eq!(e.to_string(), "parse error: 'abc' is not a number");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_range() {
        let e = Error::Range {
            value: 7e9,
            min: 10e6,
            max: 6e9,
        };
        assert_eq!(e.to_string(), "value 7000000000 outside range [10000000, 6000000000]");
    }

    #[test]
    fn error_display_invalid_choice() {
        let e = Error::InvalidChoice {
            value: "XY".into(),
            choices: vec!["AC".into(), "DC".into()],
        };
        assert_eq!(e.to_string(), "invalid choice 'XY', expected one of: AC, DC");
    }

    #[test]
    fn error_display_access_denied() {
        let e = Error::AccessDenied {
            command: ":WAVeform:PREamble".into(),
            access: AccessKind::ReadOnly,
        };
        assert_eq!(e.to_string(), "property ':WAVeform:PREamble' is read-only");

        let e = Error::AccessDenied {
            command: ":WAVeform:POINts".into(),
            access: AccessKind::WriteOnly,
        };
        assert_eq!(e.to_string(), "property ':WAVeform:POINts' is write-only");
    }

    #[test]
    fn error_display_registry() {
        assert_eq!(
            Error::UnknownModel("XYZ123".into()).to_string(),
            "no driver registered for model: XYZ123"
        );
        assert_eq!(
            Error::UnknownTemplate("HS9000X".into()).to_string(),
            "invalid template reference: HS9000X"
        );
    }

    #[test]
    fn error_display_not_connected() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
