//! The DSOX1204G oscilloscope and its subsystems.

use metrlib_core::error::{Error, Result};
use metrlib_core::{Identity, InstrumentDefinition};
use metrlib_scpi::property::{
    Select, SelectProperty, Switch, SwitchProperty, Value, ValueProperty, parse_switch,
    short_form,
};
use metrlib_scpi::subsystem::{Indexed, Scope, Subsystem};
use metrlib_scpi::{Choice, ScpiInstrument, scpi_choice};
use tracing::{debug, info};

use crate::models::ScopeModel;
use crate::waveform::{Waveform, WaveformFormat, WaveformSource};

// ---------------------------------------------------------------------------
// Acquire
// ---------------------------------------------------------------------------

scpi_choice! {
    pub enum AcquireMode {
        RealTime => "RTIMe",
        Segmented => "SEGMented",
    }
}

scpi_choice! {
    pub enum AcquireType {
        Normal => "NORMal",
        Average => "AVERage",
        HighResolution => "HRESolution",
        Peak => "PEAK",
    }
}

const ACQUIRE_MODE: SelectProperty<AcquireMode> = SelectProperty::new(":MODE");
const ACQUIRE_TYPE: SelectProperty<AcquireType> = SelectProperty::new(":TYPE");
const SAMPLE_RATE: ValueProperty = ValueProperty::new(":SRATe").range(0.1, 1e9);
const ACQUIRE_COUNT: ValueProperty = ValueProperty::new(":COUNt").int().range(1.0, 10_000.0);

/// Acquisition settings, `:ACQuire`.
#[derive(Debug, Clone)]
pub struct Acquire {
    scope: Scope,
}

impl Subsystem for Acquire {
    fn from_scope(scope: Scope) -> Self {
        Acquire { scope }
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Acquire {
    pub fn mode(&self) -> Select<'_, AcquireMode> {
        self.scope.select(&ACQUIRE_MODE)
    }

    pub fn acquire_type(&self) -> Select<'_, AcquireType> {
        self.scope.select(&ACQUIRE_TYPE)
    }

    /// Sample rate in samples per second.
    pub fn sample_rate(&self) -> Value<'_> {
        self.scope.value(&SAMPLE_RATE)
    }

    /// Averaging count.
    pub fn count(&self) -> Value<'_> {
        self.scope.value(&ACQUIRE_COUNT)
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

scpi_choice! {
    pub enum Coupling {
        Ac => "AC",
        Dc => "DC",
    }
}

const COUPLING: SelectProperty<Coupling> = SelectProperty::new(":COUPling");
const DISPLAY: SwitchProperty = SwitchProperty::new(":DISPlay");
const VERTICAL_SCALE: ValueProperty = ValueProperty::new(":SCALe").range(1e-3, 1e3).units("V");
const VERTICAL_OFFSET: ValueProperty = ValueProperty::new(":OFFSet")
    .range(-100.0, 100.0)
    .units("V");
const PROBE: ValueProperty = ValueProperty::new(":PROBe");

/// An analog input channel, `:CHANnel<n>`.
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
    pub fn coupling(&self) -> Select<'_, Coupling> {
        self.scope.select(&COUPLING)
    }

    /// Trace shown on screen and acquired.
    pub fn display(&self) -> Switch<'_> {
        self.scope.switch(&DISPLAY)
    }

    /// Volts per division.
    pub fn scale(&self) -> Value<'_> {
        self.scope.value(&VERTICAL_SCALE)
    }

    pub fn offset(&self) -> Value<'_> {
        self.scope.value(&VERTICAL_OFFSET)
    }

    /// Probe attenuation ratio.
    pub fn probe(&self) -> Value<'_> {
        self.scope.value(&PROBE)
    }
}

// ---------------------------------------------------------------------------
// Timebase
// ---------------------------------------------------------------------------

scpi_choice! {
    pub enum TimebaseMode {
        Main => "MAIN",
        Window => "WINDow",
        Xy => "XY",
        Roll => "ROLL",
    }
}

scpi_choice! {
    pub enum TimebaseReference {
        Left => "LEFT",
        Center => "CENTer",
        Right => "RIGHt",
    }
}

const TIMEBASE_MODE: SelectProperty<TimebaseMode> = SelectProperty::new(":MODE");
const TIMEBASE_REFERENCE: SelectProperty<TimebaseReference> = SelectProperty::new(":REFerence");
const TIMEBASE_SCALE: ValueProperty = ValueProperty::new(":SCALe").range(1e-9, 1.0).units("s");
const TIMEBASE_POSITION: ValueProperty = ValueProperty::new(":POSition")
    .range(-5.0, 5.0)
    .units("s");
const TIMEBASE_RANGE: ValueProperty = ValueProperty::new(":RANGe").range(2e-9, 50.0).units("s");

/// Horizontal settings, `:TIMebase`.
#[derive(Debug, Clone)]
pub struct Timebase {
    scope: Scope,
}

impl Subsystem for Timebase {
    fn from_scope(scope: Scope) -> Self {
        Timebase { scope }
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Timebase {
    pub fn mode(&self) -> Select<'_, TimebaseMode> {
        self.scope.select(&TIMEBASE_MODE)
    }

    pub fn reference(&self) -> Select<'_, TimebaseReference> {
        self.scope.select(&TIMEBASE_REFERENCE)
    }

    /// Seconds per division.
    pub fn scale(&self) -> Value<'_> {
        self.scope.value(&TIMEBASE_SCALE)
    }

    /// Trigger delay in seconds.
    pub fn position(&self) -> Value<'_> {
        self.scope.value(&TIMEBASE_POSITION)
    }

    /// Full-screen time span.
    pub fn range(&self) -> Value<'_> {
        self.scope.value(&TIMEBASE_RANGE)
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

scpi_choice! {
    pub enum TriggerMode {
        Edge => "EDGE",
        Glitch => "GLITch",
        Pattern => "PATTern",
        SetupHold => "SHOLd",
        None => "NONE",
    }
}

scpi_choice! {
    pub enum TriggerSource {
        Channel1 => "CHANnel1",
        Channel2 => "CHANnel2",
        Channel3 => "CHANnel3",
        Channel4 => "CHANnel4",
        External => "EXTernal",
        Line => "LINE",
        WaveGen => "WGEN",
    }
}

scpi_choice! {
    pub enum TriggerSlope {
        Positive => "POSitive",
        Negative => "NEGative",
    }
}

scpi_choice! {
    pub enum TriggerSweep {
        Auto => "AUTO",
        Normal => "NORMal",
    }
}

const TRIGGER_MODE: SelectProperty<TriggerMode> = SelectProperty::new(":MODE");
const TRIGGER_SOURCE: SelectProperty<TriggerSource> = SelectProperty::new(":SOURce");
const TRIGGER_SLOPE: SelectProperty<TriggerSlope> = SelectProperty::new(":SLOPe");
const TRIGGER_SWEEP: SelectProperty<TriggerSweep> = SelectProperty::new(":SWEep");
const TRIGGER_LEVEL: ValueProperty = ValueProperty::new(":LEVel").range(-5.0, 5.0).units("V");

/// Trigger settings, `:TRIGger`.
#[derive(Debug, Clone)]
pub struct Trigger {
    scope: Scope,
}

impl Subsystem for Trigger {
    fn from_scope(scope: Scope) -> Self {
        Trigger { scope }
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Trigger {
    pub fn mode(&self) -> Select<'_, TriggerMode> {
        self.scope.select(&TRIGGER_MODE)
    }

    pub fn source(&self) -> Select<'_, TriggerSource> {
        self.scope.select(&TRIGGER_SOURCE)
    }

    pub fn slope(&self) -> Select<'_, TriggerSlope> {
        self.scope.select(&TRIGGER_SLOPE)
    }

    pub fn sweep(&self) -> Select<'_, TriggerSweep> {
        self.scope.select(&TRIGGER_SWEEP)
    }

    /// Trigger level in volts.
    pub fn level(&self) -> Value<'_> {
        self.scope.value(&TRIGGER_LEVEL)
    }
}

// ---------------------------------------------------------------------------
// Waveform generator
// ---------------------------------------------------------------------------

scpi_choice! {
    pub enum WaveGenFunction {
        Sine => "SINusoid",
        Square => "SQUare",
        Ramp => "RAMP",
        Pulse => "PULSe",
        Noise => "NOISe",
        Dc => "DC",
    }
}

const WGEN_FUNCTION: SelectProperty<WaveGenFunction> = SelectProperty::new(":FUNCtion");
const WGEN_OUTPUT: SwitchProperty = SwitchProperty::new(":OUTPut");
const WGEN_FREQUENCY: ValueProperty = ValueProperty::new(":FREQuency")
    .range(1e-3, 1e8)
    .units("Hz");
const WGEN_AMPLITUDE: ValueProperty = ValueProperty::new(":VOLTage").range(1e-3, 10.0).units("V");
const WGEN_OFFSET: ValueProperty = ValueProperty::new(":VOLTage:OFFSet")
    .range(-5.0, 5.0)
    .units("V");

/// Built-in function generator, `:WGEN`.
#[derive(Debug, Clone)]
pub struct WaveGen {
    scope: Scope,
}

impl Subsystem for WaveGen {
    fn from_scope(scope: Scope) -> Self {
        WaveGen { scope }
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl WaveGen {
    pub fn function(&self) -> Select<'_, WaveGenFunction> {
        self.scope.select(&WGEN_FUNCTION)
    }

    pub fn output(&self) -> Switch<'_> {
        self.scope.switch(&WGEN_OUTPUT)
    }

    pub fn frequency(&self) -> Value<'_> {
        self.scope.value(&WGEN_FREQUENCY)
    }

    /// Peak-to-peak amplitude in volts.
    pub fn amplitude(&self) -> Value<'_> {
        self.scope.value(&WGEN_AMPLITUDE)
    }

    pub fn offset(&self) -> Value<'_> {
        self.scope.value(&WGEN_OFFSET)
    }
}

// ---------------------------------------------------------------------------
// Instrument
// ---------------------------------------------------------------------------

/// One captured waveform in physical units.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// Source short name, e.g. "CHAN1".
    pub label: String,
    /// Seconds relative to the trigger.
    pub time: Vec<f64>,
    /// Volts.
    pub values: Vec<f64>,
}

/// A Keysight DSOX1204G oscilloscope.
///
/// Construct with [`Dsox1204gBuilder`](crate::Dsox1204gBuilder).
///
/// ```no_run
/// use metrlib_keysight::{Dsox1204gBuilder, models::dsox1204g};
/// use metrlib_keysight::waveform::WaveformSource;
///
/// # async fn example() -> metrlib_core::Result<()> {
/// let mut scope = Dsox1204gBuilder::new(dsox1204g()).host("192.168.1.50").build().await?;
/// scope.channel(1)?.scale().set(0.5).await?;
/// let traces = scope.fetch_trace(&[WaveformSource::Channel1]).await?;
/// println!("{} points", traces[0].values.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Dsox1204g {
    inst: ScpiInstrument,
    model: ScopeModel,
    acquire: Acquire,
    channels: Indexed<Channel>,
    timebase: Timebase,
    trigger: Trigger,
    wavegen: WaveGen,
    waveform: Waveform,
    data_format: WaveformFormat,
    active_sources: Vec<WaveformSource>,
}

impl Dsox1204g {
    pub(crate) fn new(inst: ScpiInstrument, model: ScopeModel, channels: usize) -> Result<Self> {
        let root = inst.root();
        Ok(Dsox1204g {
            acquire: Acquire::single(&root, ":ACQuire"),
            channels: Channel::indexed(&root, ":CHANnel", channels)?,
            timebase: Timebase::single(&root, ":TIMebase"),
            trigger: Trigger::single(&root, ":TRIGger"),
            wavegen: WaveGen::single(&root, ":WGEN"),
            waveform: Waveform::single(&root, ":WAVeform"),
            data_format: WaveformFormat::Byte,
            active_sources: vec![WaveformSource::Channel1],
            inst,
            model,
        })
    }

    /// The underlying SCPI session, for raw commands.
    pub fn instrument(&self) -> &ScpiInstrument {
        &self.inst
    }

    pub fn model(&self) -> &ScopeModel {
        &self.model
    }

    pub fn info(&self) -> InstrumentDefinition {
        let mut info = InstrumentDefinition::from(&self.model);
        info.channels = u8::try_from(self.channels.len()).unwrap_or(u8::MAX);
        info
    }

    pub fn acquire(&self) -> &Acquire {
        &self.acquire
    }

    /// Analog channel `n` (1-based).
    pub fn channel(&self, n: usize) -> Result<&Channel> {
        self.channels.channel(n)
    }

    pub fn channels(&self) -> &Indexed<Channel> {
        &self.channels
    }

    pub fn timebase(&self) -> &Timebase {
        &self.timebase
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn wavegen(&self) -> &WaveGen {
        &self.wavegen
    }

    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }

    pub fn waveform_mut(&mut self) -> &mut Waveform {
        &mut self.waveform
    }

    /// Transfer encoding used by [`fetch_trace`](Self::fetch_trace)
    /// (default: BYTE).
    pub fn data_format(&self) -> WaveformFormat {
        self.data_format
    }

    pub fn set_data_format(&mut self, format: WaveformFormat) {
        self.data_format = format;
    }

    /// Sources used when a command is given none (default: channel 1).
    pub fn active_sources(&self) -> &[WaveformSource] {
        &self.active_sources
    }

    pub fn set_active_sources(&mut self, sources: &[WaveformSource]) {
        self.active_sources = sources.to_vec();
    }

    pub async fn identify(&self) -> Result<Identity> {
        self.inst.identify().await
    }

    /// `:AUTOScale` the given sources, or the active sources if empty.
    pub async fn autoscale(&self, sources: &[WaveformSource]) -> Result<()> {
        let command = self.source_command(":AUTOScale", sources)?;
        self.inst.write(&command).await.map(drop)
    }

    /// `:DIGitize` the given sources, or the active sources if empty.
    pub async fn digitize(&self, sources: &[WaveformSource]) -> Result<()> {
        let command = self.source_command(":DIGitize", sources)?;
        self.inst.write(&command).await.map(drop)
    }

    /// Stop, wait for pending operations, then arm a single acquisition.
    pub async fn single(&self) -> Result<()> {
        self.inst.write(":STOP").await?;
        self.inst.operation_complete().await?;
        self.inst.write(":SINGle").await.map(drop)
    }

    pub async fn stop(&self) -> Result<()> {
        self.inst.write(":STOP").await.map(drop)
    }

    /// Continuous acquisition.
    pub async fn run(&self) -> Result<()> {
        self.inst.write(":RUN").await.map(drop)
    }

    /// `:AER?`: whether the trigger has armed since last asked.
    pub async fn trigger_armed(&self) -> Result<bool> {
        parse_switch(&self.inst.query(":AER?").await?)
    }

    /// Digitize `sources` (or the active sources) and read each back.
    pub async fn fetch_trace(&mut self, sources: &[WaveformSource]) -> Result<Vec<Trace>> {
        let sources = if sources.is_empty() {
            self.active_sources.clone()
        } else {
            sources.to_vec()
        };
        self.digitize(&sources).await?;
        self.inst.operation_complete().await?;

        let mut traces = Vec::with_capacity(sources.len());
        for source in sources {
            self.waveform.source().set(source).await?;
            self.waveform.format().set(self.data_format).await?;
            let time: Vec<f64> = self.waveform.fetch_time().await?.collect();
            let values = self.waveform.fetch_data(None).await?;
            let label = short_form(source.token());
            debug!(source = %label, points = values.len(), "Fetched trace");
            traces.push(Trace {
                label,
                time,
                values,
            });
        }
        Ok(traces)
    }

    pub async fn close(&self) -> Result<()> {
        info!(model = self.model.name, "Closing oscilloscope");
        self.inst.close().await
    }

    fn source_command(&self, header: &str, sources: &[WaveformSource]) -> Result<String> {
        let sources = if sources.is_empty() {
            &self.active_sources[..]
        } else {
            sources
        };
        if sources.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "{header} needs at least one source"
            )));
        }
        let list = sources
            .iter()
            .map(|s| s.token())
            .collect::<Vec<_>>()
            .join(",");
        Ok(format!("{header} {list}"))
    }
}
