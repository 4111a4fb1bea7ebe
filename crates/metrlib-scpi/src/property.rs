//! Declarative SCPI property descriptors.
//!
//! A descriptor describes one instrument setting: its command suffix, who
//! may read or write it, and how values are validated and encoded.
//! Descriptors are `const` values shared by every instance of a subsystem;
//! binding one to a [`Scope`] yields a short-lived handle that performs the
//! I/O:
//!
//! ```text
//! query: <prefix><suffix>?
//! write: <prefix><suffix><join><value><units>
//! ```
//!
//! Validation (access mode, range, choice membership) always happens before
//! anything is sent, so a rejected value never reaches the instrument.
//! Nothing is cached: every `get` is a query and every `set` a write.

use std::marker::PhantomData;

use metrlib_core::error::{AccessKind, Error, Result};
use metrlib_core::units::{parse_quantity, si_str_to_float};
use tracing::debug;

use crate::block::{self, ByteOrder, SampleFormat};
use crate::subsystem::Scope;

/// Who may read or write a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    fn check_get(self, command: &str) -> Result<()> {
        match self {
            Access::Write => Err(Error::AccessDenied {
                command: command.to_string(),
                access: AccessKind::WriteOnly,
            }),
            _ => Ok(()),
        }
    }

    fn check_set(self, command: &str) -> Result<()> {
        match self {
            Access::Read => Err(Error::AccessDenied {
                command: command.to_string(),
                access: AccessKind::ReadOnly,
            }),
            _ => Ok(()),
        }
    }
}

/// Numeric representation of a [`ValueProperty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Float,
    Int,
}

fn query_command(prefix: &str, suffix: &str) -> String {
    format!("{prefix}{suffix}?")
}

/// Strip surrounding whitespace and one pair of double quotes.
fn unquote(reply: &str) -> &str {
    let s = reply.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

// ---------------------------------------------------------------------------
// Numeric values
// ---------------------------------------------------------------------------

/// A numeric setting with optional bounds and unit suffix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueProperty {
    pub suffix: &'static str,
    pub access: Access,
    pub kind: NumberKind,
    /// Inclusive bounds.
    pub range: Option<(f64, f64)>,
    /// Appended to written values and stripped from replies.
    pub units: &'static str,
    pub join: &'static str,
}

impl ValueProperty {
    /// A read-write float property with no bounds, no units, and `" "` join.
    pub const fn new(suffix: &'static str) -> Self {
        ValueProperty {
            suffix,
            access: Access::ReadWrite,
            kind: NumberKind::Float,
            range: None,
            units: "",
            join: " ",
        }
    }

    pub const fn int(mut self) -> Self {
        self.kind = NumberKind::Int;
        self
    }

    pub const fn range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub const fn units(mut self, units: &'static str) -> Self {
        self.units = units;
        self
    }

    pub const fn join(mut self, join: &'static str) -> Self {
        self.join = join;
        self
    }

    pub const fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub const fn read_only(self) -> Self {
        self.access(Access::Read)
    }

    pub const fn write_only(self) -> Self {
        self.access(Access::Write)
    }

    /// Check `value` against kind and range.
    ///
    /// NaN and infinities are never sent; integers must fit an `i64`.
    pub fn validate(&self, value: f64) -> Result<()> {
        if let Some((min, max)) = self.range {
            if !(min..=max).contains(&value) {
                return Err(Error::Range { value, min, max });
            }
        }
        if !value.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "'{}' takes a finite number, got {value}",
                self.suffix
            )));
        }
        if self.kind == NumberKind::Int {
            if value.fract() != 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "'{}' takes an integer, got {value}",
                    self.suffix
                )));
            }
            // i64::MAX as f64 rounds up to 2^63, which does not fit.
            if value < i64::MIN as f64 || value >= i64::MAX as f64 {
                return Err(Error::InvalidParameter(format!(
                    "'{}' value {value} does not fit a 64-bit integer",
                    self.suffix
                )));
            }
        }
        Ok(())
    }

    /// The validated write command under `prefix`.
    pub fn write_command(&self, prefix: &str, value: f64) -> Result<String> {
        self.access.check_set(&format!("{prefix}{}", self.suffix))?;
        self.validate(value)?;
        let encoded = match self.kind {
            NumberKind::Float => format!("{value}"),
            NumberKind::Int => format!("{}", value as i64),
        };
        Ok(format!(
            "{prefix}{}{}{encoded}{}",
            self.suffix, self.join, self.units
        ))
    }

    /// Parse a reply, stripping the unit string and any SI prefix.
    pub fn parse_reply(&self, reply: &str) -> Result<f64> {
        let value = parse_quantity(unquote(reply), self.units)?;
        if self.kind == NumberKind::Int && value.fract() != 0.0 {
            return Err(Error::Parse(format!(
                "expected an integer reply, got '{}'",
                reply.trim()
            )));
        }
        Ok(value)
    }
}

/// A [`ValueProperty`] bound to a scope.
#[derive(Debug, Clone, Copy)]
pub struct Value<'a> {
    scope: &'a Scope,
    prop: &'a ValueProperty,
}

impl Value<'_> {
    /// The full command path (without `?`).
    pub fn command(&self) -> String {
        self.scope.command(self.prop.suffix)
    }

    pub async fn get(&self) -> Result<f64> {
        self.prop.access.check_get(&self.command())?;
        let reply = self
            .scope
            .instrument()
            .query(&query_command(self.scope.prefix(), self.prop.suffix))
            .await?;
        self.prop.parse_reply(&reply)
    }

    /// Read an integer property.
    pub async fn get_int(&self) -> Result<i64> {
        let value = self.get().await?;
        if value.fract() != 0.0 || !value.is_finite() {
            return Err(Error::Parse(format!("expected an integer, got {value}")));
        }
        Ok(value as i64)
    }

    pub async fn set(&self, value: f64) -> Result<()> {
        let command = self.prop.write_command(self.scope.prefix(), value)?;
        debug!(command = %command, "Setting value property");
        self.scope.instrument().write(&command).await.map(drop)
    }

    /// Set from text such as `"2105MHz"`, `"-5 dBm"`, or `"100M"`.
    pub async fn set_str(&self, value: &str) -> Result<()> {
        self.set(parse_quantity(value, self.prop.units)?).await
    }
}

// ---------------------------------------------------------------------------
// Enumerated selections
// ---------------------------------------------------------------------------

/// An explicitly declared set of SCPI tokens.
///
/// Declare implementors with [`scpi_choice!`](crate::scpi_choice).
pub trait Choice: Copy + PartialEq + Sized + 'static {
    /// Every variant, in declaration order.
    const ALL: &'static [Self];

    /// The literal SCPI token, in long form with the short form in upper
    /// case (`"RTIMe"`).
    fn token(self) -> &'static str;

    /// All tokens, for error messages.
    fn tokens() -> Vec<String> {
        Self::ALL.iter().map(|c| c.token().to_string()).collect()
    }

    /// Match free text against the tokens.
    ///
    /// Case-insensitive: exact token, then SCPI short form (the upper-case
    /// part, `"RTIM"`), then a unique prefix. No match or several prefix
    /// matches is [`Error::InvalidChoice`].
    fn parse_choice(input: &str) -> Result<Self> {
        match_choice(Self::ALL, input)
    }
}

/// The SCPI short form of a mixed-case token (`"RTIMe"` → `"RTIM"`).
pub fn short_form(token: &str) -> String {
    if token.chars().any(|c| c.is_ascii_lowercase()) {
        token.chars().filter(|c| !c.is_ascii_lowercase()).collect()
    } else {
        token.to_string()
    }
}

fn match_choice<C: Choice>(all: &[C], input: &str) -> Result<C> {
    let value = unquote(input);
    let invalid = |choices: Vec<String>| Error::InvalidChoice {
        value: value.to_string(),
        choices,
    };
    if value.is_empty() {
        return Err(invalid(C::tokens()));
    }

    if let Some(c) = all.iter().find(|c| c.token().eq_ignore_ascii_case(value)) {
        return Ok(*c);
    }

    let short: Vec<C> = all
        .iter()
        .copied()
        .filter(|c| short_form(c.token()).eq_ignore_ascii_case(value))
        .collect();
    if let [only] = short.as_slice() {
        return Ok(*only);
    }

    let upper = value.to_ascii_uppercase();
    let candidates: Vec<C> = all
        .iter()
        .copied()
        .filter(|c| {
            let token = c.token().to_ascii_uppercase();
            token.starts_with(&upper) || upper.starts_with(&token)
        })
        .collect();
    match candidates.as_slice() {
        [only] => Ok(*only),
        [] => Err(invalid(C::tokens())),
        many => Err(invalid(many.iter().map(|c| c.token().to_string()).collect())),
    }
}

/// Declare an enum of SCPI tokens implementing [`Choice`], `Display`, and
/// `FromStr`.
///
/// ```
/// metrlib_scpi::scpi_choice! {
///     /// Acquisition mode.
///     pub enum AcquireMode {
///         RealTime => "RTIMe",
///         Segmented => "SEGMented",
///     }
/// }
///
/// let mode: AcquireMode = "rtim".parse().unwrap();
/// assert_eq!(mode, AcquireMode::RealTime);
/// assert_eq!(AcquireMode::Segmented.to_string(), "SEGMented");
/// ```
#[macro_export]
macro_rules! scpi_choice {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $token:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $crate::property::Choice for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn token(self) -> &'static str {
                match self {
                    $($name::$variant => $token),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::property::Choice::token(*self))
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::Error;

            fn from_str(s: &str) -> $crate::Result<Self> {
                <Self as $crate::property::Choice>::parse_choice(s)
            }
        }
    };
}

/// A setting restricted to the tokens of `C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectProperty<C> {
    pub suffix: &'static str,
    pub access: Access,
    pub join: &'static str,
    choices: PhantomData<C>,
}

impl<C: Choice> SelectProperty<C> {
    pub const fn new(suffix: &'static str) -> Self {
        SelectProperty {
            suffix,
            access: Access::ReadWrite,
            join: " ",
            choices: PhantomData,
        }
    }

    pub const fn join(mut self, join: &'static str) -> Self {
        self.join = join;
        self
    }

    pub const fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn write_command(&self, prefix: &str, choice: C) -> Result<String> {
        self.access.check_set(&format!("{prefix}{}", self.suffix))?;
        Ok(format!(
            "{prefix}{}{}{}",
            self.suffix,
            self.join,
            choice.token()
        ))
    }
}

/// A [`SelectProperty`] bound to a scope.
#[derive(Debug)]
pub struct Select<'a, C> {
    scope: &'a Scope,
    prop: &'a SelectProperty<C>,
}

impl<C: Choice> Select<'_, C> {
    pub fn command(&self) -> String {
        self.scope.command(self.prop.suffix)
    }

    pub async fn get(&self) -> Result<C> {
        self.prop.access.check_get(&self.command())?;
        let reply = self
            .scope
            .instrument()
            .query(&query_command(self.scope.prefix(), self.prop.suffix))
            .await?;
        C::parse_choice(&reply)
    }

    pub async fn set(&self, choice: C) -> Result<()> {
        let command = self.prop.write_command(self.scope.prefix(), choice)?;
        debug!(command = %command, "Setting select property");
        self.scope.instrument().write(&command).await.map(drop)
    }

    /// Set from free text, matched as [`Choice::parse_choice`] does.
    pub async fn set_str(&self, value: &str) -> Result<()> {
        self.prop.access.check_set(&self.command())?;
        self.set(C::parse_choice(value)?).await
    }
}

// ---------------------------------------------------------------------------
// Booleans
// ---------------------------------------------------------------------------

/// How a [`SwitchProperty`] writes booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchFormat {
    OnOff,
    TrueFalse,
    #[default]
    OneZero,
}

impl SwitchFormat {
    fn encode(self, on: bool) -> &'static str {
        match (self, on) {
            (SwitchFormat::OnOff, true) => "ON",
            (SwitchFormat::OnOff, false) => "OFF",
            (SwitchFormat::TrueFalse, true) => "TRUE",
            (SwitchFormat::TrueFalse, false) => "FALSE",
            (SwitchFormat::OneZero, true) => "1",
            (SwitchFormat::OneZero, false) => "0",
        }
    }
}

/// Interpret `on/1/true/yes` and `off/0/false/no`, case-insensitively.
pub fn parse_switch(s: &str) -> Result<bool> {
    match unquote(s).to_ascii_lowercase().as_str() {
        "on" | "1" | "+1" | "true" | "yes" => Ok(true),
        "off" | "0" | "+0" | "false" | "no" => Ok(false),
        other => Err(Error::Parse(format!("'{other}' is not a boolean"))),
    }
}

/// A boolean setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchProperty {
    pub suffix: &'static str,
    pub access: Access,
    pub format: SwitchFormat,
    pub join: &'static str,
}

impl SwitchProperty {
    pub const fn new(suffix: &'static str) -> Self {
        SwitchProperty {
            suffix,
            access: Access::ReadWrite,
            format: SwitchFormat::OneZero,
            join: " ",
        }
    }

    pub const fn format(mut self, format: SwitchFormat) -> Self {
        self.format = format;
        self
    }

    pub const fn join(mut self, join: &'static str) -> Self {
        self.join = join;
        self
    }

    pub const fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn write_command(&self, prefix: &str, on: bool) -> Result<String> {
        self.access.check_set(&format!("{prefix}{}", self.suffix))?;
        Ok(format!(
            "{prefix}{}{}{}",
            self.suffix,
            self.join,
            self.format.encode(on)
        ))
    }
}

/// A [`SwitchProperty`] bound to a scope.
#[derive(Debug, Clone, Copy)]
pub struct Switch<'a> {
    scope: &'a Scope,
    prop: &'a SwitchProperty,
}

impl Switch<'_> {
    pub fn command(&self) -> String {
        self.scope.command(self.prop.suffix)
    }

    pub async fn get(&self) -> Result<bool> {
        self.prop.access.check_get(&self.command())?;
        let reply = self
            .scope
            .instrument()
            .query(&query_command(self.scope.prefix(), self.prop.suffix))
            .await?;
        parse_switch(&reply)
    }

    pub async fn set(&self, on: bool) -> Result<()> {
        let command = self.prop.write_command(self.scope.prefix(), on)?;
        self.scope.instrument().write(&command).await.map(drop)
    }

    pub async fn set_str(&self, value: &str) -> Result<()> {
        self.prop.access.check_set(&self.command())?;
        self.set(parse_switch(value)?).await
    }
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// A free-text setting such as an IP address or a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextProperty {
    pub suffix: &'static str,
    pub access: Access,
    pub join: &'static str,
    /// Wrap written values in double quotes.
    pub quoted: bool,
}

impl TextProperty {
    pub const fn new(suffix: &'static str) -> Self {
        TextProperty {
            suffix,
            access: Access::ReadWrite,
            join: " ",
            quoted: false,
        }
    }

    pub const fn join(mut self, join: &'static str) -> Self {
        self.join = join;
        self
    }

    pub const fn quoted(mut self) -> Self {
        self.quoted = true;
        self
    }

    pub const fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn write_command(&self, prefix: &str, value: &str) -> Result<String> {
        self.access.check_set(&format!("{prefix}{}", self.suffix))?;
        let value = if self.quoted {
            format!("\"{value}\"")
        } else {
            value.to_string()
        };
        Ok(format!("{prefix}{}{}{value}", self.suffix, self.join))
    }
}

/// A [`TextProperty`] bound to a scope.
#[derive(Debug, Clone, Copy)]
pub struct Text<'a> {
    scope: &'a Scope,
    prop: &'a TextProperty,
}

impl Text<'_> {
    pub fn command(&self) -> String {
        self.scope.command(self.prop.suffix)
    }

    /// The reply, trimmed and unquoted.
    pub async fn get(&self) -> Result<String> {
        self.prop.access.check_get(&self.command())?;
        let reply = self
            .scope
            .instrument()
            .query(&query_command(self.scope.prefix(), self.prop.suffix))
            .await?;
        Ok(unquote(&reply).to_string())
    }

    pub async fn set(&self, value: &str) -> Result<()> {
        let command = self.prop.write_command(self.scope.prefix(), value)?;
        self.scope.instrument().write(&command).await.map(drop)
    }
}

// ---------------------------------------------------------------------------
// ASCII arrays
// ---------------------------------------------------------------------------

/// A comma-separated numeric list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataProperty {
    pub suffix: &'static str,
    pub access: Access,
    pub join: &'static str,
}

impl DataProperty {
    pub const fn new(suffix: &'static str) -> Self {
        DataProperty {
            suffix,
            access: Access::ReadWrite,
            join: " ",
        }
    }

    pub const fn join(mut self, join: &'static str) -> Self {
        self.join = join;
        self
    }

    pub const fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub const fn read_only(self) -> Self {
        self.access(Access::Read)
    }

    /// Split a reply on commas, skipping empty fields.
    pub fn parse_reply(reply: &str) -> Result<Vec<f64>> {
        reply
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(si_str_to_float)
            .collect()
    }

    pub fn write_command(&self, prefix: &str, values: &[f64]) -> Result<String> {
        self.access.check_set(&format!("{prefix}{}", self.suffix))?;
        let joined = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        Ok(format!("{prefix}{}{}{joined}", self.suffix, self.join))
    }
}

/// A [`DataProperty`] bound to a scope.
#[derive(Debug, Clone, Copy)]
pub struct Data<'a> {
    scope: &'a Scope,
    prop: &'a DataProperty,
}

impl Data<'_> {
    pub fn command(&self) -> String {
        self.scope.command(self.prop.suffix)
    }

    pub async fn get(&self) -> Result<Vec<f64>> {
        self.prop.access.check_get(&self.command())?;
        let reply = self
            .scope
            .instrument()
            .query(&query_command(self.scope.prefix(), self.prop.suffix))
            .await?;
        DataProperty::parse_reply(&reply)
    }

    pub async fn set(&self, values: &[f64]) -> Result<()> {
        let command = self.prop.write_command(self.scope.prefix(), values)?;
        self.scope.instrument().write(&command).await.map(drop)
    }
}

// ---------------------------------------------------------------------------
// Binary blocks
// ---------------------------------------------------------------------------

/// A binary transfer, IEEE-488.2 framed unless `ieee_header` is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockProperty {
    pub suffix: &'static str,
    pub access: Access,
    pub join: &'static str,
    pub ieee_header: bool,
}

impl BlockProperty {
    pub const fn new(suffix: &'static str) -> Self {
        BlockProperty {
            suffix,
            access: Access::ReadWrite,
            join: " ",
            ieee_header: true,
        }
    }

    pub const fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub const fn read_only(self) -> Self {
        self.access(Access::Read)
    }

    /// Exchange raw bytes without block framing.
    pub const fn raw(mut self) -> Self {
        self.ieee_header = false;
        self
    }
}

/// A [`BlockProperty`] bound to a scope.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    scope: &'a Scope,
    prop: &'a BlockProperty,
}

impl Block<'_> {
    pub fn command(&self) -> String {
        self.scope.command(self.prop.suffix)
    }

    /// The payload bytes.
    pub async fn get_bytes(&self) -> Result<Vec<u8>> {
        self.prop.access.check_get(&self.command())?;
        let command = query_command(self.scope.prefix(), self.prop.suffix);
        let instrument = self.scope.instrument();
        if self.prop.ieee_header {
            instrument.query_bytes(&command).await
        } else {
            Ok(instrument.query(&command).await?.into_bytes())
        }
    }

    /// The payload decoded as binary samples.
    pub async fn get_samples(&self, format: SampleFormat, order: ByteOrder) -> Result<Vec<f64>> {
        block::decode_samples(&self.get_bytes().await?, format, order)
    }

    pub async fn set_bytes(&self, payload: &[u8]) -> Result<()> {
        let command = self.command();
        self.prop.access.check_set(&command)?;
        let instrument = self.scope.instrument();
        if self.prop.ieee_header {
            instrument
                .write_bytes(&command, self.prop.join, payload)
                .await
                .map(drop)
        } else {
            let text = String::from_utf8_lossy(payload);
            instrument
                .write(&format!("{command}{}{text}", self.prop.join))
                .await
                .map(drop)
        }
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

impl Scope {
    pub fn value<'a>(&'a self, prop: &'a ValueProperty) -> Value<'a> {
        Value { scope: self, prop }
    }

    pub fn select<'a, C: Choice>(&'a self, prop: &'a SelectProperty<C>) -> Select<'a, C> {
        Select { scope: self, prop }
    }

    pub fn switch<'a>(&'a self, prop: &'a SwitchProperty) -> Switch<'a> {
        Switch { scope: self, prop }
    }

    pub fn text<'a>(&'a self, prop: &'a TextProperty) -> Text<'a> {
        Text { scope: self, prop }
    }

    pub fn data<'a>(&'a self, prop: &'a DataProperty) -> Data<'a> {
        Data { scope: self, prop }
    }

    pub fn block<'a>(&'a self, prop: &'a BlockProperty) -> Block<'a> {
        Block { scope: self, prop }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{ScpiConfig, ScpiInstrument};
    use metrlib_test_harness::MockTransport;

    crate::scpi_choice! {
        enum Mode {
            RealTime => "RTIMe",
            Segmented => "SEGMented",
        }
    }

    crate::scpi_choice! {
        enum Acq {
            Normal => "NORMal",
            Peak => "PEAK",
            Average => "AVERage",
            HighRes => "HRESolution",
        }
    }

    crate::scpi_choice! {
        enum Coupling {
            Ac => "AC",
            Dc => "DC",
            DcLimited => "DCLimit",
        }
    }

    const POWER: ValueProperty = ValueProperty::new(":PWR")
        .range(-20.0, 20.0)
        .units("dBm")
        .join(":");
    const COUNT: ValueProperty = ValueProperty::new(":COUNt").int().range(2.0, 65536.0);
    const POINTS: ValueProperty = ValueProperty::new(":POINts").int().write_only();
    const TEMPERATURE: ValueProperty = ValueProperty::new(":TEMP").join(":").read_only();
    const MODE: SelectProperty<Mode> = SelectProperty::new(":MODE");
    const OUTPUT: SwitchProperty = SwitchProperty::new(":PWR:RF")
        .format(SwitchFormat::OnOff)
        .join(":");
    const DISPLAY: SwitchProperty = SwitchProperty::new(":DISPlay");
    const ADDRESS: TextProperty = TextProperty::new(":ADDR").join(":");
    const LABEL: TextProperty = TextProperty::new(":LABel").quoted();
    const PREAMBLE: DataProperty = DataProperty::new(":PREamble").read_only();
    const DATA: BlockProperty = BlockProperty::new(":DATA").read_only();
    const ARB: BlockProperty = BlockProperty::new(":ARBitrary:DATA");

    fn scope(mock: &MockTransport, prefix: &str) -> Scope {
        ScpiInstrument::new(Box::new(mock.clone()), ScpiConfig::default())
            .root()
            .child(prefix, None)
    }

    #[test]
    fn short_forms() {
        assert_eq!(short_form("RTIMe"), "RTIM");
        assert_eq!(short_form("HRESolution"), "HRES");
        assert_eq!(short_form("EXT:10MHz"), "EXT:10MH");
        assert_eq!(short_form("AC"), "AC");
    }

    #[test]
    fn choice_matching() {
        assert_eq!(Mode::parse_choice("RTIMe").unwrap(), Mode::RealTime);
        assert_eq!(Mode::parse_choice("rtime").unwrap(), Mode::RealTime);
        assert_eq!(Mode::parse_choice("RTIM").unwrap(), Mode::RealTime);
        assert_eq!(Mode::parse_choice("seg").unwrap(), Mode::Segmented);
        assert_eq!(Mode::parse_choice("\"SEGM\"").unwrap(), Mode::Segmented);
        assert_eq!(Acq::parse_choice("AVER").unwrap(), Acq::Average);
        assert_eq!(Acq::parse_choice("hres").unwrap(), Acq::HighRes);
        // "DC" is exact even though it prefixes "DCLimit".
        assert_eq!(Coupling::parse_choice("dc").unwrap(), Coupling::Dc);
        assert_eq!(Coupling::parse_choice("DCL").unwrap(), Coupling::DcLimited);
    }

    #[test]
    fn choice_rejections() {
        match Mode::parse_choice("BOGUS") {
            Err(Error::InvalidChoice { value, choices }) => {
                assert_eq!(value, "BOGUS");
                assert_eq!(choices, vec!["RTIMe", "SEGMented"]);
            }
            other => panic!("expected InvalidChoice, got {other:?}"),
        }
        // Ambiguous prefix lists the candidates.
        match Acq::parse_choice("") {
            Err(Error::InvalidChoice { .. }) => {}
            other => panic!("expected InvalidChoice, got {other:?}"),
        }
        crate::scpi_choice! {
            enum Slope {
                Positive => "POSitive",
                Pulse => "PULSe",
            }
        }
        match Slope::parse_choice("P") {
            Err(Error::InvalidChoice { choices, .. }) => {
                assert_eq!(choices, vec!["POSitive", "PULSe"]);
            }
            other => panic!("expected ambiguous InvalidChoice, got {other:?}"),
        }
    }

    #[test]
    fn choice_display_and_from_str() {
        assert_eq!(Acq::HighRes.to_string(), "HRESolution");
        assert_eq!("peak".parse::<Acq>().unwrap(), Acq::Peak);
    }

    #[test]
    fn value_write_commands() {
        assert_eq!(
            POWER.write_command(":CH1", -5.0).unwrap(),
            ":CH1:PWR:-5dBm"
        );
        assert_eq!(
            COUNT.write_command(":ACQuire", 16.0).unwrap(),
            ":ACQuire:COUNt 16"
        );
        assert!(matches!(
            COUNT.write_command(":ACQuire", 2.5),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            POWER.write_command(":CH1", f64::NAN),
            Err(Error::Range { .. })
        ));
    }

    #[test]
    fn unranged_values_must_be_finite() {
        const OFFSET: ValueProperty = ValueProperty::new(":OFFSet");
        const STEPS: ValueProperty = ValueProperty::new(":STEPs").int();

        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                OFFSET.write_command(":CHANnel1", value),
                Err(Error::InvalidParameter(_))
            ));
            assert!(matches!(
                STEPS.write_command(":SWEep", value),
                Err(Error::InvalidParameter(_))
            ));
        }
        assert!(matches!(
            STEPS.write_command(":SWEep", 1e30),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            STEPS.write_command(":SWEep", -1e19),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(
            STEPS.write_command(":SWEep", -4096.0).unwrap(),
            ":SWEep:STEPs -4096"
        );
        assert_eq!(
            OFFSET.write_command(":CHANnel1", 1e-3).unwrap(),
            ":CHANnel1:OFFSet 0.001"
        );
    }

    #[test]
    fn value_reply_parsing() {
        assert_eq!(POWER.parse_reply("-5.00 dBm").unwrap(), -5.0);
        assert_eq!(POWER.parse_reply("+1.0E+01").unwrap(), 10.0);
        assert_eq!(COUNT.parse_reply("+1.6E+01").unwrap(), 16.0);
        assert!(matches!(COUNT.parse_reply("1.5"), Err(Error::Parse(_))));
        assert!(matches!(POWER.parse_reply("bogus"), Err(Error::Parse(_))));
    }

    #[tokio::test]
    async fn value_get_and_set() {
        let mock = MockTransport::new();
        mock.expect_write(":CH1:PWR:10dBm");
        mock.expect_query(":CH1:PWR?", "10.00 dBm");
        let ch = scope(&mock, ":CH1");

        ch.value(&POWER).set(10.0).await.unwrap();
        assert_eq!(ch.value(&POWER).get().await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn value_set_str_applies_prefix() {
        let mock = MockTransport::new();
        mock.expect_write(":CH1:PWR:-5dBm");
        let ch = scope(&mock, ":CH1");

        ch.value(&POWER).set_str("-5 dBm").await.unwrap();
        assert!(matches!(
            ch.value(&POWER).set_str("loud").await,
            Err(Error::Parse(_))
        ));
        assert_eq!(mock.sent_lines(), vec![":CH1:PWR:-5dBm"]);
    }

    #[tokio::test]
    async fn out_of_range_sends_nothing() {
        let mock = MockTransport::new();
        let ch = scope(&mock, ":CH1");

        match ch.value(&POWER).set(21.0).await {
            Err(Error::Range { value, min, max }) => {
                assert_eq!((value, min, max), (21.0, -20.0, 20.0));
            }
            other => panic!("expected Range, got {other:?}"),
        }
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test]
    async fn access_is_checked_before_io() {
        let mock = MockTransport::new();
        let wav = scope(&mock, ":WAVeform");

        match wav.value(&POINTS).get().await {
            Err(Error::AccessDenied { command, access }) => {
                assert_eq!(command, ":WAVeform:POINts");
                assert_eq!(access, AccessKind::WriteOnly);
            }
            other => panic!("expected AccessDenied, got {other:?}"),
        }
        assert!(matches!(
            wav.value(&TEMPERATURE).set(1.0).await,
            Err(Error::AccessDenied {
                access: AccessKind::ReadOnly,
                ..
            })
        ));
        assert!(matches!(
            wav.data(&PREAMBLE).set(&[1.0]).await,
            Err(Error::AccessDenied { .. })
        ));
        assert!(matches!(
            wav.block(&DATA).set_bytes(b"x").await,
            Err(Error::AccessDenied { .. })
        ));
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test]
    async fn get_int_rejects_fractions() {
        let mock = MockTransport::new();
        mock.expect_query(":ACQuire:COUNt?", "8");
        let acq = scope(&mock, ":ACQuire");
        assert_eq!(acq.value(&COUNT).get_int().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn select_round_trip() {
        let mock = MockTransport::new();
        mock.expect_write(":ACQuire:MODE SEGMented");
        mock.expect_query(":ACQuire:MODE?", "SEGM");
        let acq = scope(&mock, ":ACQuire");

        acq.select(&MODE).set(Mode::Segmented).await.unwrap();
        assert_eq!(acq.select(&MODE).get().await.unwrap(), Mode::Segmented);
    }

    #[tokio::test]
    async fn select_invalid_text_sends_nothing() {
        let mock = MockTransport::new();
        let acq = scope(&mock, ":ACQuire");

        assert!(matches!(
            acq.select(&MODE).set_str("turbo").await,
            Err(Error::InvalidChoice { .. })
        ));
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test]
    async fn select_unknown_reply_is_invalid_choice() {
        let mock = MockTransport::new();
        mock.expect_query(":ACQuire:MODE?", "WEIRD");
        let acq = scope(&mock, ":ACQuire");

        assert!(matches!(
            acq.select(&MODE).get().await,
            Err(Error::InvalidChoice { .. })
        ));
    }

    #[tokio::test]
    async fn switch_formats_and_replies() {
        let mock = MockTransport::new();
        mock.expect_write(":CH2:PWR:RF:ON");
        mock.expect_write(":CHANnel1:DISPlay 0");
        mock.expect_query(":CH2:PWR:RF?", "ON");
        mock.expect_query(":CHANnel1:DISPlay?", "0");
        let ch2 = scope(&mock, ":CH2");
        let chan1 = scope(&mock, ":CHANnel1");

        ch2.switch(&OUTPUT).set_str("yes").await.unwrap();
        chan1.switch(&DISPLAY).set(false).await.unwrap();
        assert!(ch2.switch(&OUTPUT).get().await.unwrap());
        assert!(!chan1.switch(&DISPLAY).get().await.unwrap());
        assert!(matches!(
            ch2.switch(&OUTPUT).set_str("maybe").await,
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn switch_words() {
        for s in ["on", "ON", "1", "true", "Yes"] {
            assert!(parse_switch(s).unwrap(), "{s}");
        }
        for s in ["off", "0", "FALSE", "no"] {
            assert!(!parse_switch(s).unwrap(), "{s}");
        }
        assert_eq!(SwitchFormat::default(), SwitchFormat::OneZero);
        assert_eq!(SwitchFormat::TrueFalse.encode(true), "TRUE");
    }

    #[tokio::test]
    async fn text_properties() {
        let mock = MockTransport::new();
        mock.expect_write(":IP:ADDR:192.168.1.20");
        mock.expect_query(":IP:ADDR?", "192.168.1.20");
        mock.expect_write(":CHANnel1:LABel \"CLOCK\"");
        mock.expect_query(":CHANnel1:LABel?", "\"CLOCK\"");
        let ip = scope(&mock, ":IP");
        let chan1 = scope(&mock, ":CHANnel1");

        ip.text(&ADDRESS).set("192.168.1.20").await.unwrap();
        assert_eq!(ip.text(&ADDRESS).get().await.unwrap(), "192.168.1.20");
        chan1.text(&LABEL).set("CLOCK").await.unwrap();
        assert_eq!(chan1.text(&LABEL).get().await.unwrap(), "CLOCK");
    }

    #[tokio::test]
    async fn data_property_parses_lists() {
        let mock = MockTransport::new();
        mock.expect_query(
            ":WAVeform:PREamble?",
            "+0,+0,+3,+1,+1.0E-06,+0.0E+00,+0,+1.0E-02,+0.0E+00,+128,",
        );
        let wav = scope(&mock, ":WAVeform");

        let fields = wav.data(&PREAMBLE).get().await.unwrap();
        assert_eq!(fields.len(), 10);
        assert_eq!(fields[4], 1e-6);
        assert_eq!(fields[9], 128.0);
    }

    #[test]
    fn data_write_command_joins_values() {
        const LIST: DataProperty = DataProperty::new(":LIST:FREQ");
        assert_eq!(
            LIST.write_command(":SOUR", &[1e6, 2.5e6]).unwrap(),
            ":SOUR:LIST:FREQ 1000000,2500000"
        );
        assert!(matches!(
            DataProperty::parse_reply("1,x,3"),
            Err(Error::Parse(_))
        ));
    }

    #[tokio::test]
    async fn block_property_reads_and_writes() {
        let mock = MockTransport::new();
        mock.expect(b":WAVeform:DATA?\n", b"#14\x00\x01\xff\xfe\n");
        mock.expect(b":WGEN:ARBitrary:DATA #12\x01\x02\n", b"");
        let wav = scope(&mock, ":WAVeform");
        let wgen = scope(&mock, ":WGEN");

        let samples = wav
            .block(&DATA)
            .get_samples(SampleFormat::I16, ByteOrder::MsbFirst)
            .await
            .unwrap();
        assert_eq!(samples, vec![1.0, -2.0]);
        wgen.block(&ARB).set_bytes(&[1, 2]).await.unwrap();
        assert_eq!(mock.remaining_expectations(), 0);
    }
}
