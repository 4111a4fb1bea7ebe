//! IEEE-488.2 Standard Event Status Register.

use std::fmt;

/// Contents of the Standard Event Status Register (`*ESR?`).
///
/// Reading the register clears it on the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventStatus(pub u8);

impl EventStatus {
    /// Operation complete (`*OPC` finished).
    pub const OPC: u8 = 1 << 0;
    /// Request control.
    pub const RQC: u8 = 1 << 1;
    /// Query error: reply read when none was available, or lost.
    pub const QYE: u8 = 1 << 2;
    /// Device-dependent error.
    pub const DDE: u8 = 1 << 3;
    /// Execution error: parameter out of range or not executable.
    pub const EXE: u8 = 1 << 4;
    /// Command error: syntax or unknown header.
    pub const CME: u8 = 1 << 5;
    /// User request.
    pub const URQ: u8 = 1 << 6;
    /// Power on since the register was last read.
    pub const PON: u8 = 1 << 7;

    const NAMES: [(u8, &'static str); 8] = [
        (Self::OPC, "OPC"),
        (Self::RQC, "RQC"),
        (Self::QYE, "QYE"),
        (Self::DDE, "DDE"),
        (Self::EXE, "EXE"),
        (Self::CME, "CME"),
        (Self::URQ, "URQ"),
        (Self::PON, "PON"),
    ];

    /// The raw register value.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// True if every bit of `mask` is set.
    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    pub fn operation_complete(self) -> bool {
        self.contains(Self::OPC)
    }

    /// True if any of QYE, DDE, EXE, or CME is set.
    pub fn has_error(self) -> bool {
        self.0 & (Self::QYE | Self::DDE | Self::EXE | Self::CME) != 0
    }

    pub fn power_on(self) -> bool {
        self.contains(Self::PON)
    }

    /// Names of the set bits, least significant first.
    pub fn flags(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = self.flags();
        if flags.is_empty() {
            write!(f, "0")
        } else {
            write!(f, "{} ({})", self.0, flags.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_named_bits() {
        let esr = EventStatus(0b1010_0001);
        assert!(esr.operation_complete());
        assert!(esr.power_on());
        assert!(esr.has_error());
        assert_eq!(esr.flags(), vec!["OPC", "CME", "PON"]);
        assert_eq!(esr.to_string(), "161 (OPC|CME|PON)");
    }

    #[test]
    fn empty_register() {
        let esr = EventStatus::default();
        assert!(!esr.has_error());
        assert!(esr.flags().is_empty());
        assert_eq!(esr.to_string(), "0");
    }

    #[test]
    fn contains_requires_all_bits() {
        let esr = EventStatus(EventStatus::EXE);
        assert!(esr.contains(EventStatus::EXE));
        assert!(!esr.contains(EventStatus::EXE | EventStatus::CME));
    }
}
