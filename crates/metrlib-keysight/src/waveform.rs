//! Waveform transfer: preamble parsing and sample scaling.
//!
//! A transfer cycle reads `:WAVeform:PREamble?` (ten comma-separated
//! fields), then the data block for the selected source. Binary samples are
//! scaled to volts with the preamble's vertical constants; ASCII samples
//! already are volts.
//!
//! ```text
//! time[i]  = (i - x_reference) * x_increment + x_origin
//! volts[i] = (raw[i] - y_reference) * y_increment + y_origin
//! ```
//!
//! The preamble is cached on the [`Waveform`] subsystem. What happens when a
//! refetch fails to parse is set by [`PreamblePolicy`].

use metrlib_core::error::{Error, Result};
use metrlib_scpi::block::{ByteOrder, SampleFormat};
use metrlib_scpi::property::{
    Block, BlockProperty, Data, DataProperty, Select, SelectProperty, Switch, SwitchProperty,
    Value, ValueProperty,
};
use metrlib_scpi::subsystem::{Scope, Subsystem};
use metrlib_scpi::scpi_choice;
use tracing::{debug, warn};

scpi_choice! {
    /// Waveform transfer encoding.
    pub enum WaveformFormat {
        Byte => "BYTE",
        Word => "WORD",
        Ascii => "ASCii",
    }
}

impl WaveformFormat {
    /// Decode the preamble's format field.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(WaveformFormat::Byte),
            1 => Ok(WaveformFormat::Word),
            4 => Ok(WaveformFormat::Ascii),
            other => Err(Error::Parse(format!("unknown waveform format code {other}"))),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            WaveformFormat::Byte => 0,
            WaveformFormat::Word => 1,
            WaveformFormat::Ascii => 4,
        }
    }
}

scpi_choice! {
    /// A waveform source.
    pub enum WaveformSource {
        Channel1 => "CHANnel1",
        Channel2 => "CHANnel2",
        Channel3 => "CHANnel3",
        Channel4 => "CHANnel4",
        Function => "FUNCtion",
        Math => "MATH",
        Fft => "FFT",
        Memory => "WMEMory",
        Bus1 => "BUS1",
        Bus2 => "BUS2",
        External => "EXTernal",
    }
}

impl WaveformSource {
    /// The analog channel source for channel `n` (1-4).
    pub fn channel(n: usize) -> Result<Self> {
        match n {
            1 => Ok(WaveformSource::Channel1),
            2 => Ok(WaveformSource::Channel2),
            3 => Ok(WaveformSource::Channel3),
            4 => Ok(WaveformSource::Channel4),
            other => Err(Error::InvalidParameter(format!(
                "channel {other} out of range 1..=4"
            ))),
        }
    }
}

scpi_choice! {
    pub enum PointsMode {
        Normal => "NORMal",
        Maximum => "MAXimum",
        Raw => "RAW",
    }
}

scpi_choice! {
    /// Byte order of WORD transfers.
    pub enum WordOrder {
        LsbFirst => "LSBFirst",
        MsbFirst => "MSBFirst",
    }
}

impl From<WordOrder> for ByteOrder {
    fn from(order: WordOrder) -> Self {
        match order {
            WordOrder::LsbFirst => ByteOrder::LsbFirst,
            WordOrder::MsbFirst => ByteOrder::MsbFirst,
        }
    }
}

// ---------------------------------------------------------------------------
// Preamble
// ---------------------------------------------------------------------------

/// Number of fields in a `:WAVeform:PREamble?` reply.
pub const PREAMBLE_FIELDS: usize = 10;

/// Scale and offset constants for one waveform transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preamble {
    pub format: WaveformFormat,
    /// Acquisition type code (0 normal, 1 peak, 2 average, 3 high-res).
    pub acquire_type: i64,
    pub points: usize,
    /// Averaging count.
    pub count: i64,
    pub x_increment: f64,
    pub x_origin: f64,
    pub x_reference: f64,
    pub y_increment: f64,
    pub y_origin: f64,
    pub y_reference: f64,
}

impl Preamble {
    /// Parse the comma-separated preamble reply.
    ///
    /// ```
    /// use metrlib_keysight::waveform::{Preamble, WaveformFormat};
    ///
    /// let p = Preamble::parse("+0,+0,+3,+1,+1.0E-06,+0.0E+00,+0,+1.0E-02,+0.0E+00,+128").unwrap();
    /// assert_eq!(p.format, WaveformFormat::Byte);
    /// assert_eq!(p.points, 3);
    /// assert_eq!(p.y_reference, 128.0);
    /// ```
    pub fn parse(reply: &str) -> Result<Self> {
        Self::from_fields(&DataProperty::parse_reply(reply)?)
    }

    /// Build from already-split numeric fields.
    pub fn from_fields(fields: &[f64]) -> Result<Self> {
        if fields.len() < PREAMBLE_FIELDS {
            return Err(Error::Parse(format!(
                "preamble has {} fields, expected {PREAMBLE_FIELDS}",
                fields.len()
            )));
        }
        let integral = |i: usize, name: &str| -> Result<i64> {
            let v = fields[i];
            if v.fract() != 0.0 || !v.is_finite() {
                return Err(Error::Parse(format!("preamble {name} is not an integer: {v}")));
            }
            Ok(v as i64)
        };
        let points = integral(2, "points")?;
        Ok(Preamble {
            format: WaveformFormat::from_code(integral(0, "format")?)?,
            acquire_type: integral(1, "type")?,
            points: usize::try_from(points)
                .map_err(|_| Error::Parse(format!("preamble points is negative: {points}")))?,
            count: integral(3, "count")?,
            x_increment: fields[4],
            x_origin: fields[5],
            x_reference: fields[6],
            y_increment: fields[7],
            y_origin: fields[8],
            y_reference: fields[9],
        })
    }

    /// Timestamps of every point, computed on demand.
    pub fn time_axis(&self) -> TimeAxis {
        TimeAxis {
            index: 0,
            len: self.points,
            x_increment: self.x_increment,
            x_origin: self.x_origin,
            x_reference: self.x_reference,
        }
    }

    /// Convert one raw sample to volts.
    pub fn scale(&self, raw: f64) -> f64 {
        (raw - self.y_reference) * self.y_increment + self.y_origin
    }

    pub fn scale_samples(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter().map(|&r| self.scale(r)).collect()
    }
}

/// Lazy sequence of sample timestamps.
#[derive(Debug, Clone)]
pub struct TimeAxis {
    index: usize,
    len: usize,
    x_increment: f64,
    x_origin: f64,
    x_reference: f64,
}

impl Iterator for TimeAxis {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.index >= self.len {
            return None;
        }
        let t = (self.index as f64 - self.x_reference) * self.x_increment + self.x_origin;
        self.index += 1;
        Some(t)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TimeAxis {}

/// What [`Waveform::fetch_preamble`] does with a reply that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreamblePolicy {
    /// Log at `warn!` and keep the previously cached preamble.
    #[default]
    KeepStale,
    /// Return the parse error.
    Propagate,
}

// ---------------------------------------------------------------------------
// Waveform subsystem
// ---------------------------------------------------------------------------

const SOURCE: SelectProperty<WaveformSource> = SelectProperty::new(":SOURce");
const FORMAT: SelectProperty<WaveformFormat> = SelectProperty::new(":FORMat");
const POINTS_MODE: SelectProperty<PointsMode> = SelectProperty::new(":POINts:MODE");
const BYTE_ORDER: SelectProperty<WordOrder> = SelectProperty::new(":BYTeorder");
const UNSIGNED: SwitchProperty = SwitchProperty::new(":UNSigned");
const POINTS: ValueProperty = ValueProperty::new(":POINts").int().write_only();
const X_INCREMENT: ValueProperty = ValueProperty::new(":XINCrement").read_only();
const X_ORIGIN: ValueProperty = ValueProperty::new(":XORigin").read_only();
const X_REFERENCE: ValueProperty = ValueProperty::new(":XREFerence").read_only();
const Y_INCREMENT: ValueProperty = ValueProperty::new(":YINCrement").read_only();
const Y_ORIGIN: ValueProperty = ValueProperty::new(":YORigin").read_only();
const Y_REFERENCE: ValueProperty = ValueProperty::new(":YREFerence").read_only();
const PREAMBLE: DataProperty = DataProperty::new(":PREamble").read_only();
const DATA: BlockProperty = BlockProperty::new(":DATa").read_only();

/// The `:WAVeform` subsystem with a cached preamble.
#[derive(Debug, Clone)]
pub struct Waveform {
    scope: Scope,
    cached: Option<Preamble>,
    policy: PreamblePolicy,
}

impl Subsystem for Waveform {
    fn from_scope(scope: Scope) -> Self {
        Waveform {
            scope,
            cached: None,
            policy: PreamblePolicy::default(),
        }
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Waveform {
    pub fn source(&self) -> Select<'_, WaveformSource> {
        self.scope.select(&SOURCE)
    }

    pub fn format(&self) -> Select<'_, WaveformFormat> {
        self.scope.select(&FORMAT)
    }

    pub fn points_mode(&self) -> Select<'_, PointsMode> {
        self.scope.select(&POINTS_MODE)
    }

    pub fn byte_order(&self) -> Select<'_, WordOrder> {
        self.scope.select(&BYTE_ORDER)
    }

    pub fn unsigned(&self) -> Switch<'_> {
        self.scope.switch(&UNSIGNED)
    }

    /// Number of points to transfer. Write-only.
    pub fn points(&self) -> Value<'_> {
        self.scope.value(&POINTS)
    }

    pub fn x_increment(&self) -> Value<'_> {
        self.scope.value(&X_INCREMENT)
    }

    pub fn x_origin(&self) -> Value<'_> {
        self.scope.value(&X_ORIGIN)
    }

    pub fn x_reference(&self) -> Value<'_> {
        self.scope.value(&X_REFERENCE)
    }

    pub fn y_increment(&self) -> Value<'_> {
        self.scope.value(&Y_INCREMENT)
    }

    pub fn y_origin(&self) -> Value<'_> {
        self.scope.value(&Y_ORIGIN)
    }

    pub fn y_reference(&self) -> Value<'_> {
        self.scope.value(&Y_REFERENCE)
    }

    /// The raw preamble fields.
    pub fn preamble(&self) -> Data<'_> {
        self.scope.data(&PREAMBLE)
    }

    /// The raw data block.
    pub fn data(&self) -> Block<'_> {
        self.scope.block(&DATA)
    }

    pub fn policy(&self) -> PreamblePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: PreamblePolicy) {
        self.policy = policy;
    }

    /// The last successfully parsed preamble. May be stale; see
    /// [`PreamblePolicy`].
    pub fn cached_preamble(&self) -> Option<&Preamble> {
        self.cached.as_ref()
    }

    /// Query and parse the preamble, updating the cache.
    ///
    /// I/O errors are always returned. A reply that does not parse is
    /// handled per [`PreamblePolicy`]; with `KeepStale` the previous
    /// preamble (possibly `None`) is returned unchanged.
    pub async fn fetch_preamble(&mut self) -> Result<Option<&Preamble>> {
        let command = self.preamble().command();
        let parsed = match self.preamble().get().await {
            Ok(fields) => Preamble::from_fields(&fields),
            Err(e @ Error::Parse(_)) => Err(e),
            Err(e) => return Err(e),
        };

        match parsed {
            Ok(preamble) => {
                debug!(
                    format = %preamble.format,
                    points = preamble.points,
                    "Waveform preamble"
                );
                self.cached = Some(preamble);
            }
            Err(e) if self.policy == PreamblePolicy::KeepStale => {
                warn!(
                    command = %command,
                    error = %e,
                    stale = self.cached.is_some(),
                    "Preamble did not parse; keeping cached preamble"
                );
            }
            Err(e) => return Err(e),
        }
        Ok(self.cached.as_ref())
    }

    /// Refetch the preamble and return the time of every point.
    pub async fn fetch_time(&mut self) -> Result<TimeAxis> {
        self.fetch_preamble()
            .await?
            .map(Preamble::time_axis)
            .ok_or_else(no_preamble)
    }

    /// Read one waveform and return it in volts.
    ///
    /// Selects `source` first when given. BYTE and WORD transfers are
    /// scaled with the freshly fetched preamble; ASCII values are returned
    /// as sent.
    pub async fn fetch_data(&mut self, source: Option<WaveformSource>) -> Result<Vec<f64>> {
        if let Some(source) = source {
            self.source().set(source).await?;
        }
        let preamble = *self.fetch_preamble().await?.ok_or_else(no_preamble)?;

        let values = match preamble.format {
            WaveformFormat::Ascii => {
                let payload = self.data().get_bytes().await?;
                DataProperty::parse_reply(&String::from_utf8_lossy(&payload))?
            }
            format => {
                let word = format == WaveformFormat::Word;
                let signed = !self.unsigned().get().await?;
                let order = if word {
                    ByteOrder::from(self.byte_order().get().await?)
                } else {
                    ByteOrder::default()
                };
                let raw = self
                    .data()
                    .get_samples(SampleFormat::new(word, signed), order)
                    .await?;
                preamble.scale_samples(&raw)
            }
        };

        if values.len() != preamble.points {
            debug!(
                expected = preamble.points,
                received = values.len(),
                "Waveform length differs from preamble"
            );
        }
        Ok(values)
    }
}

fn no_preamble() -> Error {
    Error::Parse("no waveform preamble available".into())
}
