//! The HS9000 synthesizer and its subsystems.
//!
//! HS9000 commands are colon-joined throughout, including the argument:
//! `:CH1:FREQ:2105MHz`, `:CH2:PWR:RF:ON`, `:REF:EXT:10MHz`. Every
//! property here therefore uses `join(":")`.
//!
//! | Subsystem         | Prefix       |
//! |-------------------|--------------|
//! | [`Channel`] ×N    | `:CH<n>`     |
//! | [`Reference`]     | `:REF`       |
//! | [`Ip`]            | `:IP`        |
//! | [`Communication`] | `:COMM`      |
//! | [`Diagnostics`]   | `:HSX:DIAG`  |

use metrlib_core::error::Result;
use metrlib_core::{Identity, InstrumentDefinition};
use metrlib_scpi::property::{
    Select, SelectProperty, Switch, SwitchFormat, SwitchProperty, Text, TextProperty, Value,
    ValueProperty,
};
use metrlib_scpi::subsystem::{Indexed, Scope, Subsystem};
use metrlib_scpi::{ScpiInstrument, scpi_choice};
use tracing::info;

use crate::models::Hs9000Model;

scpi_choice! {
    /// Output attenuator mode.
    pub enum PowerMode {
        Auto => "AUTO",
        High => "HIGH",
        Normal => "NORMAL",
        Fix => "FIX",
    }
}

scpi_choice! {
    /// Reference clock source.
    pub enum ReferenceSource {
        /// External 10 MHz input.
        External10MHz => "EXT:10MHz",
        /// Internal 100 MHz oscillator.
        Internal100MHz => "INT:100MHz",
    }
}

scpi_choice! {
    /// LAN address assignment.
    pub enum IpMode {
        Static => "STATIC",
        Dhcp => "DHCP",
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

const FREQUENCY: ValueProperty = ValueProperty::new(":FREQ")
    .range(10e6, 6e9)
    .units("Hz")
    .join(":");
const FREQ_MIN: ValueProperty = ValueProperty::new(":FREQ:MIN")
    .units("Hz")
    .join(":")
    .read_only();
const FREQ_MAX: ValueProperty = ValueProperty::new(":FREQ:MAX")
    .units("Hz")
    .join(":")
    .read_only();
const POWER: ValueProperty = ValueProperty::new(":PWR")
    .range(-20.0, 20.0)
    .units("dBm")
    .join(":");
const OUTPUT: SwitchProperty = SwitchProperty::new(":PWR:RF")
    .format(SwitchFormat::OnOff)
    .join(":");
const POWER_MODE: SelectProperty<PowerMode> = SelectProperty::new(":PWR:MODE").join(":");
const PHASE: ValueProperty = ValueProperty::new(":PHASE")
    .range(0.0, 360.0)
    .units("deg")
    .join(":");
const PHASE_MAX: ValueProperty = ValueProperty::new(":PHASE:MAX")
    .units("deg")
    .join(":")
    .read_only();
const TEMPERATURE: ValueProperty = ValueProperty::new(":TEMP")
    .units("C")
    .join(":")
    .read_only();

/// One synthesizer channel, `:CH<n>`.
#[derive(Debug, Clone)]
pub struct Channel {
    scope: Scope,
}

impl Subsystem for Channel {
    fn from_scope(scope: Scope) -> Self {
        Channel { scope }
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Channel {
    /// Output frequency in Hz, 10 MHz to 6 GHz.
    pub fn frequency(&self) -> Value<'_> {
        self.scope.value(&FREQUENCY)
    }

    /// Lowest frequency this channel can synthesize.
    pub fn freq_min(&self) -> Value<'_> {
        self.scope.value(&FREQ_MIN)
    }

    /// Highest frequency this channel can synthesize.
    pub fn freq_max(&self) -> Value<'_> {
        self.scope.value(&FREQ_MAX)
    }

    /// Output power in dBm, -20 to +20.
    pub fn power(&self) -> Value<'_> {
        self.scope.value(&POWER)
    }

    /// RF output on/off.
    pub fn output(&self) -> Switch<'_> {
        self.scope.switch(&OUTPUT)
    }

    pub fn power_mode(&self) -> Select<'_, PowerMode> {
        self.scope.select(&POWER_MODE)
    }

    /// Phase offset in degrees, 0 to 360.
    pub fn phase(&self) -> Value<'_> {
        self.scope.value(&PHASE)
    }

    /// Largest phase offset available at the current frequency.
    pub fn phase_max(&self) -> Value<'_> {
        self.scope.value(&PHASE_MAX)
    }

    /// Channel temperature in degrees Celsius.
    pub fn temperature(&self) -> Value<'_> {
        self.scope.value(&TEMPERATURE)
    }
}

// ---------------------------------------------------------------------------
// Reference, IP, communication
// ---------------------------------------------------------------------------

const REFERENCE_SOURCE: SelectProperty<ReferenceSource> = SelectProperty::new("").join(":");

/// Reference clock, `:REF`. The source is the subsystem itself:
/// `:REF?` and `:REF:EXT:10MHz`.
#[derive(Debug, Clone)]
pub struct Reference {
    scope: Scope,
}

impl Subsystem for Reference {
    fn from_scope(scope: Scope) -> Self {
        Reference { scope }
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Reference {
    pub fn source(&self) -> Select<'_, ReferenceSource> {
        self.scope.select(&REFERENCE_SOURCE)
    }
}

const IP_MODE: SelectProperty<IpMode> = SelectProperty::new(":STATUS").join(":");
const IP_ADDRESS: TextProperty = TextProperty::new(":ADDR").join(":");
const IP_SUBNET: TextProperty = TextProperty::new(":SUBNET").join(":");
const IP_GATEWAY: TextProperty = TextProperty::new(":GATEWAY").join(":");

/// LAN configuration, `:IP`.
#[derive(Debug, Clone)]
pub struct Ip {
    scope: Scope,
}

impl Subsystem for Ip {
    fn from_scope(scope: Scope) -> Self {
        Ip { scope }
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Ip {
    pub fn mode(&self) -> Select<'_, IpMode> {
        self.scope.select(&IP_MODE)
    }

    /// Static IP address.
    pub fn address(&self) -> Text<'_> {
        self.scope.text(&IP_ADDRESS)
    }

    pub fn subnet(&self) -> Text<'_> {
        self.scope.text(&IP_SUBNET)
    }

    pub fn gateway(&self) -> Text<'_> {
        self.scope.text(&IP_GATEWAY)
    }
}

const RESPOND: SwitchProperty = SwitchProperty::new(":RESPOND")
    .format(SwitchFormat::OnOff)
    .join(":");

/// Communication settings, `:COMM`.
#[derive(Debug, Clone)]
pub struct Communication {
    scope: Scope,
}

impl Subsystem for Communication {
    fn from_scope(scope: Scope) -> Self {
        Communication { scope }
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Communication {
    /// When on, the unit acknowledges every command with a reply line.
    pub fn respond(&self) -> Switch<'_> {
        self.scope.switch(&RESPOND)
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Built-in diagnostics, `:HSX:DIAG`.
///
/// These are plain commands rather than properties. The status queries
/// carry no `?`.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    scope: Scope,
}

impl Subsystem for Diagnostics {
    fn from_scope(scope: Scope) -> Self {
        Diagnostics { scope }
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Diagnostics {
    /// Start the short diagnostic routine.
    pub async fn start(&self) -> Result<()> {
        self.scope.write(":MIN:START").await.map(drop)
    }

    /// Diagnostic progress.
    pub async fn status(&self) -> Result<String> {
        self.scope.query(":DONE").await
    }

    /// Errors found by the last run.
    pub async fn errors(&self) -> Result<String> {
        self.scope.query(":ERROR").await
    }

    /// Installed board inventory.
    pub async fn board_info(&self) -> Result<String> {
        self.scope.query(":INFO:BOARDS").await
    }
}

// ---------------------------------------------------------------------------
// Instrument
// ---------------------------------------------------------------------------

/// An HS9000-series multi-channel RF synthesizer.
///
/// Construct with [`Hs9000Builder`](crate::Hs9000Builder).
///
/// ```no_run
/// use metrlib_holzworth::{Hs9000Builder, models::hs9004b};
///
/// # async fn example() -> metrlib_core::Result<()> {
/// let synth = Hs9000Builder::new(hs9004b()).host("192.168.1.40").build().await?;
/// synth.channel(1)?.frequency().set_str("2105MHz").await?;
/// synth.channel(2)?.output().set(true).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Hs9000 {
    inst: ScpiInstrument,
    model: Hs9000Model,
    channels: Indexed<Channel>,
    reference: Reference,
    ip: Ip,
    communication: Communication,
    diagnostics: Diagnostics,
}

impl Hs9000 {
    /// Attach every subsystem to `inst`.
    ///
    /// Channels are always numbered, so a single-channel unit still uses
    /// `:CH1`.
    pub(crate) fn new(inst: ScpiInstrument, model: Hs9000Model, channels: usize) -> Result<Self> {
        let root = inst.root();
        Ok(Hs9000 {
            channels: Channel::indexed(&root, ":CH", channels)?,
            reference: Reference::single(&root, ":REF"),
            ip: Ip::single(&root, ":IP"),
            communication: Communication::single(&root, ":COMM"),
            diagnostics: Diagnostics::single(&root, ":HSX:DIAG"),
            inst,
            model,
        })
    }

    /// The underlying SCPI session, for raw commands.
    pub fn instrument(&self) -> &ScpiInstrument {
        &self.inst
    }

    pub fn model(&self) -> &Hs9000Model {
        &self.model
    }

    pub fn info(&self) -> InstrumentDefinition {
        let mut info = InstrumentDefinition::from(&self.model);
        info.channels = u8::try_from(self.channels.len()).unwrap_or(u8::MAX);
        info
    }

    /// Channel `n` (1-based).
    pub fn channel(&self, n: usize) -> Result<&Channel> {
        self.channels.channel(n)
    }

    pub fn channels(&self) -> &Indexed<Channel> {
        &self.channels
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn ip(&self) -> &Ip {
        &self.ip
    }

    pub fn communication(&self) -> &Communication {
        &self.communication
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub async fn identify(&self) -> Result<Identity> {
        self.inst.identify().await
    }

    /// Turn every channel's RF output off.
    pub async fn all_outputs_off(&self) -> Result<()> {
        for channel in &self.channels {
            channel.output().set(false).await?;
        }
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        info!(model = self.model.name, "Closing HS9000");
        self.inst.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Hs9000Builder;
    use crate::models::{hs9001b, hs9004b};
    use metrlib_core::Error;
    use metrlib_test_harness::MockTransport;

    async fn synth(mock: &MockTransport) -> Hs9000 {
        Hs9000Builder::new(hs9004b())
            .build_with_transport(Box::new(mock.clone()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn frequency_with_units() {
        let mock = MockTransport::new();
        mock.expect_write(":CH1:FREQ:2105000000Hz");
        mock.expect_query(":CH1:FREQ?", "2105 MHz");
        let synth = synth(&mock).await;

        let ch1 = synth.channel(1).unwrap();
        ch1.frequency().set_str("2105MHz").await.unwrap();
        assert_eq!(ch1.frequency().get().await.unwrap(), 2.105e9);
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn frequency_out_of_range() {
        let mock = MockTransport::new();
        let synth = synth(&mock).await;

        let result = synth.channel(3).unwrap().frequency().set(7e9).await;
        assert!(matches!(result, Err(Error::Range { .. })));
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test]
    async fn power_output_and_phase() {
        let mock = MockTransport::new();
        mock.expect_write(":CH2:PWR:-5.5dBm");
        mock.expect_write(":CH2:PWR:RF:ON");
        mock.expect_write(":CH2:PHASE:90deg");
        mock.expect_query(":CH2:PWR:RF?", "OFF");
        let synth = synth(&mock).await;

        let ch2 = synth.channel(2).unwrap();
        ch2.power().set(-5.5).await.unwrap();
        ch2.output().set(true).await.unwrap();
        ch2.phase().set(90.0).await.unwrap();
        assert!(!ch2.output().get().await.unwrap());
    }

    #[tokio::test]
    async fn read_only_channel_values() {
        let mock = MockTransport::new();
        mock.expect_query(":CH4:FREQ:MIN?", "10 MHz");
        mock.expect_query(":CH4:FREQ:MAX?", "6 GHz");
        mock.expect_query(":CH4:TEMP?", "31.5C");
        let synth = synth(&mock).await;

        let ch4 = synth.channel(4).unwrap();
        assert_eq!(ch4.freq_min().get().await.unwrap(), 10e6);
        assert_eq!(ch4.freq_max().get().await.unwrap(), 6e9);
        assert_eq!(ch4.temperature().get().await.unwrap(), 31.5);
        assert!(matches!(
            ch4.temperature().set(20.0).await,
            Err(Error::AccessDenied { .. })
        ));
    }

    #[tokio::test]
    async fn power_mode_choices() {
        let mock = MockTransport::new();
        mock.expect_write(":CH1:PWR:MODE:HIGH");
        mock.expect_query(":CH1:PWR:MODE?", "NORMAL");
        let synth = synth(&mock).await;

        let ch1 = synth.channel(1).unwrap();
        ch1.power_mode().set_str("high").await.unwrap();
        assert_eq!(ch1.power_mode().get().await.unwrap(), PowerMode::Normal);
        assert!(matches!(
            ch1.power_mode().set_str("LOW").await,
            Err(Error::InvalidChoice { .. })
        ));
    }

    #[tokio::test]
    async fn reference_source_uses_bare_prefix() {
        let mock = MockTransport::new();
        mock.expect_write(":REF:EXT:10MHz");
        mock.expect_query(":REF?", "INT:100MHz");
        let synth = synth(&mock).await;

        synth
            .reference()
            .source()
            .set(ReferenceSource::External10MHz)
            .await
            .unwrap();
        assert_eq!(
            synth.reference().source().get().await.unwrap(),
            ReferenceSource::Internal100MHz
        );
    }

    #[tokio::test]
    async fn ip_configuration() {
        let mock = MockTransport::new();
        mock.expect_write(":IP:STATUS:STATIC");
        mock.expect_write(":IP:ADDR:192.168.1.40");
        mock.expect_write(":IP:SUBNET:255.255.255.0");
        mock.expect_query(":IP:GATEWAY?", "192.168.1.1");
        let synth = synth(&mock).await;

        let ip = synth.ip();
        ip.mode().set(IpMode::Static).await.unwrap();
        ip.address().set("192.168.1.40").await.unwrap();
        ip.subnet().set("255.255.255.0").await.unwrap();
        assert_eq!(ip.gateway().get().await.unwrap(), "192.168.1.1");
    }

    #[tokio::test]
    async fn diagnostics_commands() {
        let mock = MockTransport::new();
        mock.expect_write(":HSX:DIAG:MIN:START");
        mock.expect_query(":HSX:DIAG:DONE", "RUNNING");
        mock.expect_query(":HSX:DIAG:ERROR", "NONE");
        mock.expect_query(":HSX:DIAG:INFO:BOARDS", "CH1 REV B, CH2 REV B");
        let synth = synth(&mock).await;

        let diag = synth.diagnostics();
        diag.start().await.unwrap();
        assert_eq!(diag.status().await.unwrap(), "RUNNING");
        assert_eq!(diag.errors().await.unwrap(), "NONE");
        assert_eq!(diag.board_info().await.unwrap(), "CH1 REV B, CH2 REV B");
    }

    #[tokio::test]
    async fn single_channel_unit_is_numbered() {
        let mock = MockTransport::new();
        mock.expect_write(":CH1:PWR:RF:OFF");
        let synth = Hs9000Builder::new(hs9001b())
            .build_with_transport(Box::new(mock.clone()))
            .await
            .unwrap();

        assert_eq!(synth.channels().len(), 1);
        assert!(synth.channel(2).is_err());
        synth.all_outputs_off().await.unwrap();
    }

    #[tokio::test]
    async fn all_outputs_off_visits_every_channel() {
        let mock = MockTransport::new();
        for n in 1..=4 {
            mock.expect_write(&format!(":CH{n}:PWR:RF:OFF"));
        }
        let synth = synth(&mock).await;

        synth.all_outputs_off().await.unwrap();
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn info_reports_model() {
        let mock = MockTransport::new();
        let synth = synth(&mock).await;
        let info = synth.info();
        assert_eq!(info.model_name, "HS9004B");
        assert_eq!(info.channels, 4);
    }
}
