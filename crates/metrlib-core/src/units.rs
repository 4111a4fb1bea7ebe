//! SI-prefix conversion for numeric SCPI arguments.
//!
//! Instruments and users exchange quantities like `"100M"`, `"50k"`, or
//! `"2105MHz"`. [`si_str_to_float`] handles the bare prefix form,
//! [`parse_quantity`] additionally strips a unit string, and [`format_si`]
//! goes the other way for display.

use crate::error::{Error, Result};

/// Single-letter SI prefixes and their multipliers, largest first.
///
/// `da` (deca) is the only two-letter prefix and is handled separately.
const SI_PREFIXES: &[(char, f64)] = &[
    ('Y', 1e24),
    ('Z', 1e21),
    ('E', 1e18),
    ('P', 1e15),
    ('T', 1e12),
    ('G', 1e9),
    ('M', 1e6),
    ('k', 1e3),
    ('h', 1e2),
    ('d', 1e-1),
    ('c', 1e-2),
    ('m', 1e-3),
    ('u', 1e-6),
    ('n', 1e-9),
    ('p', 1e-12),
    ('f', 1e-15),
    ('a', 1e-18),
    ('z', 1e-21),
    ('y', 1e-24),
];

/// Prefixes used by [`format_si`], indexed by `(exponent / 3) + 8`.
const ENGINEERING_PREFIXES: [&str; 17] = [
    "y", "z", "a", "f", "p", "n", "u", "m", "", "k", "M", "G", "T", "P", "E", "Z", "Y",
];

/// Convert a number with an optional SI prefix suffix to a float.
///
/// If the last character is a digit the whole string is parsed as a plain
/// float. Otherwise the trailing prefix (`da` or one of
/// `Y Z E P T G M k h d c m u n p f a z y`) scales the leading number.
/// Prefixes are case-sensitive: `M` is mega, `m` is milli.
///
/// # Example
///
/// ```
/// use metrlib_core::si_str_to_float;
///
/// assert_eq!(si_str_to_float("100M").unwrap(), 100_000_000.0);
/// assert_eq!(si_str_to_float("50k").unwrap(), 50_000.0);
/// assert_eq!(si_str_to_float("200m").unwrap(), 0.2);
/// assert_eq!(si_str_to_float("10").unwrap(), 10.0);
/// ```
pub fn si_str_to_float(s: &str) -> Result<f64> {
    let s = s.trim();
    let last = s
        .chars()
        .last()
        .ok_or_else(|| Error::Parse("empty numeric string".into()))?;

    if last.is_ascii_digit() || last == '.' {
        return parse_mantissa(s, s);
    }

    if let Some(mantissa) = s.strip_suffix("da") {
        return Ok(parse_mantissa(mantissa, s)? * 1e1);
    }

    let multiplier = SI_PREFIXES
        .iter()
        .find(|(prefix, _)| *prefix == last)
        .map(|(_, mult)| *mult)
        .ok_or_else(|| Error::Parse(format!("unknown SI suffix '{last}' in '{s}'")))?;

    let mantissa = &s[..s.len() - last.len_utf8()];
    Ok(parse_mantissa(mantissa, s)? * multiplier)
}

/// Parse a quantity that may carry both an SI prefix and a unit string.
///
/// The unit is matched case-insensitively and is optional in the input.
///
/// # Example
///
/// ```
/// use metrlib_core::parse_quantity;
///
/// assert_eq!(parse_quantity("2105MHz", "Hz").unwrap(), 2.105e9);
/// assert_eq!(parse_quantity("-5 dBm", "dBm").unwrap(), -5.0);
/// assert_eq!(parse_quantity("250m", "V").unwrap(), 0.25);
/// ```
pub fn parse_quantity(s: &str, unit: &str) -> Result<f64> {
    let trimmed = s.trim();
    let without_unit = if !unit.is_empty()
        && trimmed.len() > unit.len()
        && trimmed.is_char_boundary(trimmed.len() - unit.len())
        && trimmed[trimmed.len() - unit.len()..].eq_ignore_ascii_case(unit)
    {
        &trimmed[..trimmed.len() - unit.len()]
    } else {
        trimmed
    };
    si_str_to_float(without_unit)
}

/// Format a value with an engineering SI prefix and unit.
///
/// The mantissa is rounded to nine decimal places and printed without
/// trailing zeros.
///
/// # Example
///
/// ```
/// use metrlib_core::format_si;
///
/// assert_eq!(format_si(2.105e9, "Hz"), "2.105GHz");
/// assert_eq!(format_si(0.0025, "V"), "2.5mV");
/// assert_eq!(format_si(-20.0, "dBm"), "-20dBm");
/// ```
pub fn format_si(value: f64, unit: &str) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{value}{unit}");
    }

    let mut exponent = ((value.abs().log10() / 3.0).floor() as i32 * 3).clamp(-24, 24);
    let mut scaled = round_mantissa(value / 10f64.powi(exponent));
    if scaled.abs() >= 1000.0 && exponent < 24 {
        exponent += 3;
        scaled = round_mantissa(value / 10f64.powi(exponent));
    }

    let prefix = ENGINEERING_PREFIXES[((exponent / 3) + 8) as usize];
    format!("{scaled}{prefix}{unit}")
}

fn round_mantissa(v: f64) -> f64 {
    (v * 1e9).round() / 1e9
}

fn parse_mantissa(mantissa: &str, original: &str) -> Result<f64> {
    mantissa
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Parse(format!("'{original}' is not a number")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= b.abs() * 1e-12
    }

    #[test]
    fn plain_numbers() {
        assert_eq!(si_str_to_float("10").unwrap(), 10.0);
        assert_eq!(si_str_to_float("  3.5 ").unwrap(), 3.5);
        assert_eq!(si_str_to_float("-42").unwrap(), -42.0);
        assert_eq!(si_str_to_float("1e6").unwrap(), 1e6);
        assert_eq!(si_str_to_float("+1.5E+01").unwrap(), 15.0);
        assert_eq!(si_str_to_float("2.").unwrap(), 2.0);
    }

    #[test]
    fn common_prefixes() {
        assert_eq!(si_str_to_float("100M").unwrap(), 100_000_000.0);
        assert_eq!(si_str_to_float("50k").unwrap(), 50_000.0);
        assert_eq!(si_str_to_float("200m").unwrap(), 0.2);
        assert!(approx(si_str_to_float("2.5G").unwrap(), 2.5e9));
        assert!(approx(si_str_to_float("47u").unwrap(), 47e-6));
        assert!(approx(si_str_to_float("10n").unwrap(), 10e-9));
        assert!(approx(si_str_to_float("3p").unwrap(), 3e-12));
    }

    #[test]
    fn full_prefix_table() {
        let cases = [
            ("1Y", 1e24),
            ("1Z", 1e21),
            ("1E", 1e18),
            ("1P", 1e15),
            ("1T", 1e12),
            ("1h", 1e2),
            ("1da", 1e1),
            ("1d", 1e-1),
            ("1c", 1e-2),
            ("1f", 1e-15),
            ("1a", 1e-18),
            ("1z", 1e-21),
            ("1y", 1e-24),
        ];
        for (input, expected) in cases {
            assert!(
                approx(si_str_to_float(input).unwrap(), expected),
                "{input} should be {expected}"
            );
        }
    }

    #[test]
    fn deca_takes_precedence_over_atto() {
        assert_eq!(si_str_to_float("5da").unwrap(), 50.0);
        assert!(approx(si_str_to_float("5a").unwrap(), 5e-18));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(si_str_to_float(""), Err(Error::Parse(_))));
        assert!(matches!(si_str_to_float("   "), Err(Error::Parse(_))));
        assert!(matches!(si_str_to_float("10X"), Err(Error::Parse(_))));
        assert!(matches!(si_str_to_float("k"), Err(Error::Parse(_))));
        assert!(matches!(si_str_to_float("abcM"), Err(Error::Parse(_))));
        assert!(matches!(si_str_to_float("NaN"), Err(Error::Parse(_))));
    }

    #[test]
    fn quantity_with_units() {
        assert_eq!(parse_quantity("2105MHz", "Hz").unwrap(), 2.105e9);
        assert!(approx(parse_quantity("2105mhz", "Hz").unwrap(), 2.105));
        assert_eq!(parse_quantity("10", "Hz").unwrap(), 10.0);
        assert_eq!(parse_quantity("-5dBm", "dBm").unwrap(), -5.0);
        assert_eq!(parse_quantity("90 deg", "deg").unwrap(), 90.0);
        assert!(approx(parse_quantity("1.5GS/s", "S/s").unwrap(), 1.5e9));
        assert!(matches!(parse_quantity("Hz", "Hz"), Err(Error::Parse(_))));
    }

    #[test]
    fn format_engineering() {
        assert_eq!(format_si(2.105e9, "Hz"), "2.105GHz");
        assert_eq!(format_si(100e6, "Hz"), "100MHz");
        assert_eq!(format_si(0.0025, "V"), "2.5mV");
        assert_eq!(format_si(1e-6, "s"), "1us");
        assert_eq!(format_si(0.0, "V"), "0V");
        assert_eq!(format_si(-20.0, "dBm"), "-20dBm");
        assert_eq!(format_si(999_999.999_999_999_9, "Hz"), "1MHz");
    }

    #[test]
    fn format_then_parse_is_stable() {
        let s = format_si(12.5e3, "");
        assert_eq!(s, "12.5k");
        assert_eq!(si_str_to_float(&s).unwrap(), 12_500.0);
    }
}
