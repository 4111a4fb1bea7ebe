//! IEEE-488.2 definite-length arbitrary blocks.
//!
//! Binary transfers (waveform data, screen images, arbitrary waveforms) are
//! framed as:
//!
//! ```text
//! #<n><length><payload>
//! ```
//!
//! - `#`: block marker.
//! - `n`: one ASCII digit `1`-`9`, the number of length digits that follow.
//! - `length`: `n` ASCII digits, the payload size in bytes.
//! - `payload`: raw bytes.
//!
//! The indefinite form `#0<payload><NL>^END` relies on a bus-level END
//! signal that raw sockets and serial ports do not carry, so it is rejected.

use bytes::{Buf, BufMut, BytesMut};
use metrlib_core::error::{Error, Result};

/// Block marker byte.
pub const BLOCK_MARKER: u8 = b'#';

/// Location of a block's payload within a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Bytes occupied by `#`, the digit count, and the length digits.
    pub header_len: usize,
    /// Payload size in bytes.
    pub payload_len: usize,
}

impl BlockHeader {
    /// Total bytes occupied by header and payload.
    pub fn total_len(&self) -> usize {
        self.header_len + self.payload_len
    }
}

/// Parse a block header at the start of `buf`.
///
/// Returns `Ok(None)` if `buf` is too short to hold the complete header.
/// A buffer that does not start with `#`, an indefinite-length block, or
/// non-digit length characters are [`Error::Protocol`].
pub fn parse_header(buf: &[u8]) -> Result<Option<BlockHeader>> {
    let Some(&marker) = buf.first() else {
        return Ok(None);
    };
    if marker != BLOCK_MARKER {
        return Err(Error::Protocol(format!(
            "invalid block header: expected '#', got 0x{marker:02X}"
        )));
    }
    let Some(&count) = buf.get(1) else {
        return Ok(None);
    };
    let digits = match count {
        b'0' => {
            return Err(Error::Protocol(
                "indefinite-length block (#0) is not supported".into(),
            ));
        }
        b'1'..=b'9' => (count - b'0') as usize,
        other => {
            return Err(Error::Protocol(format!(
                "invalid block header: digit count 0x{other:02X}"
            )));
        }
    };

    let header_len = 2 + digits;
    let Some(length_digits) = buf.get(2..header_len) else {
        return Ok(None);
    };
    let payload_len = std::str::from_utf8(length_digits)
        .ok()
        .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            Error::Protocol(format!(
                "invalid block length '{}'",
                String::from_utf8_lossy(length_digits)
            ))
        })?;

    Ok(Some(BlockHeader {
        header_len,
        payload_len,
    }))
}

/// Extract the payload of a complete block.
///
/// Bytes after the payload (usually the line terminator) are ignored. A
/// buffer shorter than the header announces is [`Error::Protocol`].
///
/// # Example
///
/// ```
/// use metrlib_scpi::block::parse_block;
///
/// assert_eq!(parse_block(b"#15HELLO\n").unwrap(), b"HELLO");
/// assert_eq!(parse_block(b"#210abcdefghij").unwrap(), b"abcdefghij");
/// ```
pub fn parse_block(buf: &[u8]) -> Result<&[u8]> {
    let header = parse_header(buf)?
        .ok_or_else(|| Error::Protocol("truncated block header".into()))?;
    buf.get(header.header_len..header.total_len()).ok_or_else(|| {
        Error::Protocol(format!(
            "truncated block: header announces {} bytes, got {}",
            header.payload_len,
            buf.len().saturating_sub(header.header_len)
        ))
    })
}

/// Frame `payload` as a definite-length block.
///
/// ```
/// use metrlib_scpi::block::encode_block;
///
/// assert_eq!(encode_block(b"HELLO"), b"#15HELLO");
/// assert_eq!(encode_block(b""), b"#10");
/// ```
pub fn encode_block(payload: &[u8]) -> Vec<u8> {
    let length = payload.len().to_string();
    let mut buf = BytesMut::with_capacity(2 + length.len() + payload.len());
    buf.put_u8(BLOCK_MARKER);
    buf.put_u8(b'0' + length.len() as u8);
    buf.put_slice(length.as_bytes());
    buf.put_slice(payload);
    buf.to_vec()
}

/// Byte order of 16-bit samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Least significant byte first (little-endian).
    LsbFirst,
    /// Most significant byte first (big-endian). The power-on default of
    /// most oscilloscopes.
    #[default]
    MsbFirst,
}

/// Element type of a binary sample payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    I8,
    U16,
    I16,
}

impl SampleFormat {
    /// Select a format from element width and signedness.
    pub fn new(word: bool, signed: bool) -> Self {
        match (word, signed) {
            (false, false) => SampleFormat::U8,
            (false, true) => SampleFormat::I8,
            (true, false) => SampleFormat::U16,
            (true, true) => SampleFormat::I16,
        }
    }

    /// Element width in bytes.
    pub fn width(self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::I8 => 1,
            SampleFormat::U16 | SampleFormat::I16 => 2,
        }
    }
}

/// Decode a raw payload into sample values.
///
/// ```
/// use metrlib_scpi::block::{decode_samples, ByteOrder, SampleFormat};
///
/// let raw = [0x01, 0x00, 0xFF, 0xFF];
/// let v = decode_samples(&raw, SampleFormat::I16, ByteOrder::LsbFirst).unwrap();
/// assert_eq!(v, vec![1.0, -1.0]);
/// ```
pub fn decode_samples(payload: &[u8], format: SampleFormat, order: ByteOrder) -> Result<Vec<f64>> {
    let width = format.width();
    if payload.len() % width != 0 {
        return Err(Error::Protocol(format!(
            "payload of {} bytes is not a multiple of the {width}-byte sample width",
            payload.len()
        )));
    }

    let mut buf = payload;
    let mut samples = Vec::with_capacity(payload.len() / width);
    while buf.has_remaining() {
        let value = match (format, order) {
            (SampleFormat::U8, _) => f64::from(buf.get_u8()),
            (SampleFormat::I8, _) => f64::from(buf.get_i8()),
            (SampleFormat::U16, ByteOrder::MsbFirst) => f64::from(buf.get_u16()),
            (SampleFormat::U16, ByteOrder::LsbFirst) => f64::from(buf.get_u16_le()),
            (SampleFormat::I16, ByteOrder::MsbFirst) => f64::from(buf.get_i16()),
            (SampleFormat::I16, ByteOrder::LsbFirst) => f64::from(buf.get_i16_le()),
        };
        samples.push(value);
    }
    Ok(samples)
}
