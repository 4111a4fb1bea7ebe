//! Shared instrument types: manufacturers, connection interfaces, model
//! definitions, and the parsed `*IDN?` identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Instrument manufacturer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Manufacturer {
    /// Holzworth Instrumentation (HS9000 synthesizers).
    Holzworth,
    /// Keysight Technologies (InfiniiVision oscilloscopes).
    Keysight,
    /// Hewlett-Packard legacy GPIB equipment.
    HewlettPackard,
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Manufacturer::Holzworth => "Holzworth",
            Manufacturer::Keysight => "Keysight",
            Manufacturer::HewlettPackard => "Hewlett-Packard",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into a [`Manufacturer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseManufacturerError(String);

impl fmt::Display for ParseManufacturerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown manufacturer: '{}'. Expected: holzworth, keysight, hp",
            self.0
        )
    }
}

impl std::error::Error for ParseManufacturerError {}

impl FromStr for Manufacturer {
    type Err = ParseManufacturerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "holzworth" => Ok(Manufacturer::Holzworth),
            "keysight" | "agilent" => Ok(Manufacturer::Keysight),
            "hp" | "hewlett-packard" | "hewlettpackard" => Ok(Manufacturer::HewlettPackard),
            _ => Err(ParseManufacturerError(s.to_string())),
        }
    }
}

/// A physical interface an instrument can be reached through.
///
/// Serialized in upper case (`"VISA"`, `"SOCKET"`, `"SERIAL"`) to match
/// the driver registry file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionType {
    /// A VISA resource (GPIB, USBTMC, VXI-11).
    Visa,
    /// A raw TCP socket carrying SCPI lines.
    Socket,
    /// A direct serial port.
    Serial,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::Visa => write!(f, "VISA"),
            ConnectionType::Socket => write!(f, "SOCKET"),
            ConnectionType::Serial => write!(f, "SERIAL"),
        }
    }
}

impl FromStr for ConnectionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "VISA" => Ok(ConnectionType::Visa),
            "SOCKET" | "TCP" => Ok(ConnectionType::Socket),
            "SERIAL" => Ok(ConnectionType::Serial),
            _ => Err(Error::InvalidParameter(format!(
                "unknown interface '{s}', expected VISA, SOCKET or SERIAL"
            ))),
        }
    }
}

/// What kind of instrument a model is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// RF signal synthesizer.
    Synthesizer,
    /// Digital storage oscilloscope.
    Oscilloscope,
    /// Swept spectrum analyzer.
    SpectrumAnalyzer,
    /// Signal generator.
    SignalGenerator,
    /// RF power meter.
    PowerMeter,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstrumentKind::Synthesizer => "synthesizer",
            InstrumentKind::Oscilloscope => "oscilloscope",
            InstrumentKind::SpectrumAnalyzer => "spectrum analyzer",
            InstrumentKind::SignalGenerator => "signal generator",
            InstrumentKind::PowerMeter => "power meter",
        };
        write!(f, "{s}")
    }
}

/// A supported instrument model with enough information for a UI picker.
///
/// Driver crates convert their own model structs into this type so the
/// facade can list every supported instrument without knowing the
/// driver-specific types.
#[derive(Debug, Clone)]
pub struct InstrumentDefinition {
    /// The manufacturer of the instrument.
    pub manufacturer: Manufacturer,
    /// Model string as reported by `*IDN?` and used as the registry key.
    pub model_name: &'static str,
    /// Instrument category.
    pub kind: InstrumentKind,
    /// Number of independently addressable channels.
    pub channels: u8,
    /// Raw-socket port, if the instrument listens on one.
    pub socket_port: Option<u16>,
}

/// The four fields of an IEEE-488.2 `*IDN?` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Manufacturer name as reported (e.g. `"KEYSIGHT TECHNOLOGIES"`).
    pub manufacturer: String,
    /// Model string (e.g. `"DSO-X 1204G"`).
    pub model: String,
    /// Serial number, or `"0"` when the instrument does not report one.
    pub serial: String,
    /// Firmware revision.
    pub firmware: String,
}

impl Identity {
    /// Parse a comma-separated `*IDN?` reply.
    ///
    /// Missing trailing fields are left empty; a reply without at least a
    /// manufacturer and model is an [`Error::Parse`].
    pub fn parse(reply: &str) -> Result<Self> {
        let mut fields = reply.trim().splitn(4, ',').map(|f| f.trim().to_string());
        let manufacturer = fields.next().unwrap_or_default();
        let model = fields.next().unwrap_or_default();
        if manufacturer.is_empty() || model.is_empty() {
            return Err(Error::Parse(format!("malformed *IDN? reply: '{}'", reply.trim())));
        }
        Ok(Identity {
            manufacturer,
            model,
            serial: fields.next().unwrap_or_default(),
            firmware: fields.next().unwrap_or_default(),
        })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (serial {}, firmware {})",
            self.manufacturer, self.model, self.serial, self.firmware
        )
    }
}
