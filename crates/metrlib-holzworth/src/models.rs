//! Holzworth HS9000-series model definitions.
//!
//! Every HS9000 unit speaks the same command set; models differ only in
//! the number of synthesizer channels fitted. The model string reported by
//! `*IDN?` encodes that count (`HS9004B` has four).
//!
//! | Model   | Channels |
//! |---------|----------|
//! | HS9001B | 1        |
//! | HS9002B | 2        |
//! | HS9003B | 3        |
//! | HS9004B | 4        |
//! | HS9005B | 5        |
//! | HS9006B | 6        |
//! | HS9007B | 7        |
//! | HS9008B | 8        |

use metrlib_core::{InstrumentDefinition, InstrumentKind, Manufacturer};

/// Raw-socket TCP port of the HS9000 LAN interface.
pub const HS9000_SOCKET_PORT: u16 = 9760;

/// Static model definition for an HS9000-series synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hs9000Model {
    /// Model string as reported by `*IDN?` (e.g. "HS9004B").
    pub name: &'static str,
    /// Number of synthesizer channels.
    pub channels: u8,
}

impl From<&Hs9000Model> for InstrumentDefinition {
    fn from(model: &Hs9000Model) -> Self {
        InstrumentDefinition {
            manufacturer: Manufacturer::Holzworth,
            model_name: model.name,
            kind: InstrumentKind::Synthesizer,
            channels: model.channels,
            socket_port: Some(HS9000_SOCKET_PORT),
        }
    }
}

pub fn hs9001b() -> Hs9000Model {
    Hs9000Model {
        name: "HS9001B",
        channels: 1,
    }
}

pub fn hs9002b() -> Hs9000Model {
    Hs9000Model {
        name: "HS9002B",
        channels: 2,
    }
}

pub fn hs9003b() -> Hs9000Model {
    Hs9000Model {
        name: "HS9003B",
        channels: 3,
    }
}

/// HS9004B, the four-channel unit and the default when the model is not
/// known.
pub fn hs9004b() -> Hs9000Model {
    Hs9000Model {
        name: "HS9004B",
        channels: 4,
    }
}

pub fn hs9005b() -> Hs9000Model {
    Hs9000Model {
        name: "HS9005B",
        channels: 5,
    }
}

pub fn hs9006b() -> Hs9000Model {
    Hs9000Model {
        name: "HS9006B",
        channels: 6,
    }
}

pub fn hs9007b() -> Hs9000Model {
    Hs9000Model {
        name: "HS9007B",
        channels: 7,
    }
}

pub fn hs9008b() -> Hs9000Model {
    Hs9000Model {
        name: "HS9008B",
        channels: 8,
    }
}

/// Every supported model, in channel-count order.
pub fn all_models() -> Vec<Hs9000Model> {
    vec![
        hs9001b(),
        hs9002b(),
        hs9003b(),
        hs9004b(),
        hs9005b(),
        hs9006b(),
        hs9007b(),
        hs9008b(),
    ]
}

/// Look up a model by name, ignoring case and any `-`.
///
/// ```
/// use metrlib_holzworth::models::model_by_name;
///
/// assert_eq!(model_by_name("hs9002b").unwrap().channels, 2);
/// assert!(model_by_name("HS9009B").is_none());
/// ```
pub fn model_by_name(name: &str) -> Option<Hs9000Model> {
    let wanted: String = name
        .chars()
        .filter(|c| *c != '-')
        .collect::<String>()
        .to_ascii_uppercase();
    all_models().into_iter().find(|m| m.name == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_count_matches_model_number() {
        for model in all_models() {
            let digit = model.name.as_bytes()[5] - b'0';
            assert_eq!(model.channels, digit, "{}", model.name);
        }
    }

    #[test]
    fn definition_conversion() {
        let def = InstrumentDefinition::from(&hs9004b());
        assert_eq!(def.manufacturer, Manufacturer::Holzworth);
        assert_eq!(def.model_name, "HS9004B");
        assert_eq!(def.kind, InstrumentKind::Synthesizer);
        assert_eq!(def.channels, 4);
        assert_eq!(def.socket_port, Some(9760));
    }

    #[test]
    fn lookup_is_lenient() {
        assert_eq!(model_by_name("HS-9008B"), Some(hs9008b()));
        assert_eq!(model_by_name(" hs9001b".trim()), Some(hs9001b()));
        assert_eq!(model_by_name("DSOX1204G"), None);
    }
}
