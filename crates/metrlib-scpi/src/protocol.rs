//! SCPI line framing encoder/decoder.
//!
//! SCPI commands and replies are ASCII lines. Commands are sent with a
//! write terminator (usually `\n`); replies end with a read terminator.
//! Binary replies are IEEE-488.2 definite-length blocks (see
//! [`block`](crate::block)) which may contain terminator bytes inside the
//! payload, so the decoder recognises a leading `#<digit>` and frames by
//! length instead of by terminator.
//!
//! # Command format
//!
//! ```text
//! <header>[<join><argument>]<terminator>
//! ```
//!
//! - Query: `:CH1:FREQ?\n`
//! - Write: `:CH1:FREQ:2100000000Hz\n`, `:TIMebase:SCALe 0.001\n`
//!
//! # Reply format
//!
//! - Line: `+2.10000000E+09\n`
//! - Block: `#800000012<12 bytes>\n`

use bytes::{BufMut, BytesMut};
use metrlib_core::error::Result;

use crate::block::{self, BLOCK_MARKER};

/// Default write and read terminator.
pub const DEFAULT_TERMINATOR: &str = "\n";

/// Result of attempting to decode one reply from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete text line.
    Line {
        /// Reply text without the terminator or a trailing `\r`.
        text: String,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// A complete definite-length block.
    Block {
        /// The payload bytes, header stripped.
        payload: Vec<u8>,
        /// Number of bytes consumed, including a trailing terminator when
        /// one directly follows the payload.
        consumed: usize,
    },

    /// The buffer does not yet contain a complete reply.
    Incomplete,
}

/// Encode a command line ready for transmission.
///
/// # Example
///
/// ```
/// use metrlib_scpi::protocol::encode_command;
///
/// assert_eq!(encode_command("*IDN?", "\n"), b"*IDN?\n");
/// assert_eq!(encode_command(":CH1:PWR:-5dBm", "\r\n"), b":CH1:PWR:-5dBm\r\n");
/// ```
pub fn encode_command(command: &str, terminator: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(command.len() + terminator.len());
    buf.put_slice(command.as_bytes());
    buf.put_slice(terminator.as_bytes());
    buf.to_vec()
}

/// Encode a command whose argument is a binary block.
///
/// ```
/// use metrlib_scpi::protocol::encode_block_command;
///
/// assert_eq!(
///     encode_block_command(":WGEN:ARB:DATA", " ", &[1, 2], "\n"),
///     b":WGEN:ARB:DATA #12\x01\x02\n"
/// );
/// ```
pub fn encode_block_command(command: &str, join: &str, payload: &[u8], terminator: &str) -> Vec<u8> {
    let framed = block::encode_block(payload);
    let mut buf =
        BytesMut::with_capacity(command.len() + join.len() + framed.len() + terminator.len());
    buf.put_slice(command.as_bytes());
    buf.put_slice(join.as_bytes());
    buf.put_slice(&framed);
    buf.put_slice(terminator.as_bytes());
    buf.to_vec()
}

/// Attempt to decode one reply from `buf`.
///
/// A buffer starting with `#` followed by a digit is decoded as a block;
/// anything else is a line ending at `terminator`. A block whose payload is
/// complete but whose trailing bytes have not arrived yet is reported as
/// [`DecodeResult::Incomplete`]; use [`block::parse_block`] to accept it
/// once the reply has gone quiet.
///
/// Malformed block headers are [`Error::Protocol`](metrlib_core::Error::Protocol).
///
/// # Example
///
/// ```
/// use metrlib_scpi::protocol::{decode_response, DecodeResult};
///
/// match decode_response(b"+1.0E+01\n", b"\n").unwrap() {
///     DecodeResult::Line { text, consumed } => {
///         assert_eq!(text, "+1.0E+01");
///         assert_eq!(consumed, 9);
///     }
///     other => panic!("expected Line, got {other:?}"),
/// }
/// ```
pub fn decode_response(buf: &[u8], terminator: &[u8]) -> Result<DecodeResult> {
    if buf.is_empty() {
        return Ok(DecodeResult::Incomplete);
    }

    if buf[0] == BLOCK_MARKER && buf.get(1).is_some_and(u8::is_ascii_digit) {
        let Some(header) = block::parse_header(buf)? else {
            return Ok(DecodeResult::Incomplete);
        };
        let end = header.total_len();
        if buf.len() <= end {
            return Ok(DecodeResult::Incomplete);
        }
        let payload = buf[header.header_len..end].to_vec();
        let rest = &buf[end..];
        let consumed = if rest.starts_with(terminator) {
            end + terminator.len()
        } else if terminator.starts_with(rest) {
            // A partial terminator; wait for the remainder.
            return Ok(DecodeResult::Incomplete);
        } else {
            end
        };
        return Ok(DecodeResult::Block { payload, consumed });
    }

    let Some(pos) = find(buf, terminator) else {
        return Ok(DecodeResult::Incomplete);
    };
    let body = &buf[..pos];
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    Ok(DecodeResult::Line {
        text: String::from_utf8_lossy(body).into_owned(),
        consumed: pos + terminator.len(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
