//! Keysight oscilloscope model definitions.
//!
//! | Model     | `*IDN?` model  | Channels | Bandwidth | Max sample rate |
//! |-----------|----------------|----------|-----------|-----------------|
//! | DSOX1204G | DSO-X 1204G    | 4        | 70 MHz    | 2 GSa/s         |

use metrlib_core::{InstrumentDefinition, InstrumentKind, Manufacturer};
use metrlib_transport::SCPI_RAW_PORT;

/// Static model definition for an InfiniiVision oscilloscope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScopeModel {
    /// Registry key (e.g. "DSOX1204G").
    pub name: &'static str,
    /// Model field of the `*IDN?` reply (e.g. "DSO-X 1204G").
    pub idn_model: &'static str,
    /// Number of analog input channels.
    pub channels: u8,
    /// Analog bandwidth in Hz as shipped.
    pub bandwidth_hz: f64,
    /// Maximum sample rate in samples per second.
    pub max_sample_rate: f64,
    /// Whether the built-in waveform generator is fitted (the "G" suffix).
    pub has_wavegen: bool,
}

impl From<&ScopeModel> for InstrumentDefinition {
    fn from(model: &ScopeModel) -> Self {
        InstrumentDefinition {
            manufacturer: Manufacturer::Keysight,
            model_name: model.name,
            kind: InstrumentKind::Oscilloscope,
            channels: model.channels,
            socket_port: Some(SCPI_RAW_PORT),
        }
    }
}

/// DSOX1204G model definition.
///
/// Four-channel InfiniiVision 1000 X-Series scope with a built-in waveform
/// generator. Bandwidth is license-upgradable to 200 MHz; the value here is
/// the base unit's.
pub fn dsox1204g() -> ScopeModel {
    ScopeModel {
        name: "DSOX1204G",
        idn_model: "DSO-X 1204G",
        channels: 4,
        bandwidth_hz: 70e6,
        max_sample_rate: 2e9,
        has_wavegen: true,
    }
}

pub fn all_models() -> Vec<ScopeModel> {
    vec![dsox1204g()]
}

/// Find a model by registry name or `*IDN?` model string.
pub fn model_by_name(name: &str) -> Option<ScopeModel> {
    let name = name.trim();
    all_models()
        .into_iter()
        .find(|m| m.name.eq_ignore_ascii_case(name) || m.idn_model.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_conversion() {
        let def = InstrumentDefinition::from(&dsox1204g());
        assert_eq!(def.manufacturer, Manufacturer::Keysight);
        assert_eq!(def.kind, InstrumentKind::Oscilloscope);
        assert_eq!(def.channels, 4);
        assert_eq!(def.socket_port, Some(5025));
    }

    #[test]
    fn lookup_by_either_name() {
        assert_eq!(model_by_name("dsox1204g"), Some(dsox1204g()));
        assert_eq!(model_by_name("DSO-X 1204G"), Some(dsox1204g()));
        assert_eq!(model_by_name("HS9004B"), None);
    }
}
