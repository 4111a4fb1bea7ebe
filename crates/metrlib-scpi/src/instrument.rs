//! The SCPI instrument session.
//!
//! [`ScpiInstrument`] owns one transport and serialises every exchange on
//! it: each `write`/`query` holds the transport lock from send until the
//! reply is framed, so at most one command is in flight per instrument.
//! Handles are cheap clones sharing the same session; subsystems hold one
//! through their [`Scope`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrlib_core::error::{Error, Result};
use metrlib_core::events::InstrumentEvent;
use metrlib_core::transport::Transport;
use metrlib_core::types::Identity;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

use crate::block;
use crate::protocol::{self, DEFAULT_TERMINATOR, DecodeResult};
use crate::status::EventStatus;
use crate::subsystem::Scope;

/// Default per-command reply timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(2500);

/// Upper bound on entries drained by [`ScpiInstrument::check_error_queue`].
pub const MAX_ERROR_QUEUE_ENTRIES: usize = 100;

/// Longest text reply accepted before a terminator arrives.
pub const MAX_LINE_REPLY: usize = 64 * 1024;

/// Largest block payload a reply header may announce.
pub const MAX_BLOCK_REPLY: usize = 256 * 1024 * 1024;

/// How long to wait for a late reply after an exchange failed.
const STALE_REPLY_GRACE: Duration = Duration::from_millis(250);

/// Line-level session settings.
#[derive(Debug, Clone)]
pub struct ScpiConfig {
    /// Appended to every command sent.
    pub write_terminator: String,
    /// Ends every text reply.
    pub read_terminator: String,
    /// Maximum wait for a complete reply.
    pub command_timeout: Duration,
    /// Read one acknowledgement line after every write.
    pub read_after_write: bool,
}

impl Default for ScpiConfig {
    fn default() -> Self {
        Self {
            write_terminator: DEFAULT_TERMINATOR.to_string(),
            read_terminator: DEFAULT_TERMINATOR.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            read_after_write: false,
        }
    }
}

/// What a command expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Nothing,
    Line,
    Block,
}

#[derive(Debug)]
enum Reply {
    Line(String),
    Block(Vec<u8>),
}

struct Session {
    transport: Mutex<Box<dyn Transport>>,
    write_terminator: String,
    read_terminator: String,
    command_timeout: Duration,
    read_after_write: AtomicBool,
    /// The last reply was not read to completion and may still arrive.
    stale: AtomicBool,
    event_tx: broadcast::Sender<InstrumentEvent>,
}

/// A connected SCPI instrument.
///
/// # Example
///
/// ```no_run
/// use metrlib_scpi::{ScpiConfig, ScpiInstrument};
/// use metrlib_transport::TcpTransport;
///
/// # async fn example() -> metrlib_core::Result<()> {
/// let transport = TcpTransport::connect("192.168.1.50:5025").await?;
/// let scope = ScpiInstrument::new(Box::new(transport), ScpiConfig::default());
///
/// println!("{}", scope.identify().await?);
/// scope.write(":TIMebase:SCALe 0.001").await?;
/// let errors = scope.check_error_queue().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ScpiInstrument {
    session: Arc<Session>,
}

impl std::fmt::Debug for ScpiInstrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScpiInstrument")
            .field("command_timeout", &self.session.command_timeout)
            .field("read_after_write", &self.read_after_write())
            .finish_non_exhaustive()
    }
}

impl ScpiInstrument {
    /// Wrap an open transport.
    pub fn new(transport: Box<dyn Transport>, config: ScpiConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        ScpiInstrument {
            session: Arc::new(Session {
                transport: Mutex::new(transport),
                write_terminator: config.write_terminator,
                read_terminator: config.read_terminator,
                command_timeout: config.command_timeout,
                read_after_write: AtomicBool::new(config.read_after_write),
                stale: AtomicBool::new(false),
                event_tx,
            }),
        }
    }

    /// The root scope (empty prefix) for building subsystems.
    pub fn root(&self) -> Scope {
        Scope::new(self.clone(), "")
    }

    /// Subscribe to command/reply events.
    pub fn subscribe(&self) -> broadcast::Receiver<InstrumentEvent> {
        self.session.event_tx.subscribe()
    }

    pub fn command_timeout(&self) -> Duration {
        self.session.command_timeout
    }

    pub fn read_after_write(&self) -> bool {
        self.session.read_after_write.load(Ordering::Relaxed)
    }

    /// Change whether writes read back an acknowledgement line.
    pub fn set_read_after_write(&self, enabled: bool) {
        self.session
            .read_after_write
            .store(enabled, Ordering::Relaxed);
    }

    // -----------------------------------------------------------------
    // Raw I/O
    // -----------------------------------------------------------------

    /// Send a command.
    ///
    /// With `read_after_write` enabled, one reply line is read and returned;
    /// a reply that looks like an instrument error is logged at `warn!`.
    pub async fn write(&self, command: &str) -> Result<Option<String>> {
        if !self.read_after_write() {
            self.exchange(command, Expect::Nothing).await?;
            return Ok(None);
        }

        match self.exchange(command, Expect::Line).await? {
            Some(Reply::Line(ack)) => {
                if is_error_reply(&ack) {
                    warn!(command = %command, reply = %ack, "Instrument rejected command");
                }
                Ok(Some(ack))
            }
            Some(Reply::Block(payload)) => Ok(Some(String::from_utf8_lossy(&payload).into_owned())),
            None => Ok(None),
        }
    }

    /// Send a query and return the reply line.
    ///
    /// A block reply is returned as lossy UTF-8 text.
    pub async fn query(&self, command: &str) -> Result<String> {
        match self.exchange(command, Expect::Line).await? {
            Some(Reply::Line(text)) => Ok(text),
            Some(Reply::Block(payload)) => Ok(String::from_utf8_lossy(&payload).into_owned()),
            None => Err(Error::Timeout),
        }
    }

    /// Send a query whose reply is an IEEE-488.2 block and return the payload.
    pub async fn query_bytes(&self, command: &str) -> Result<Vec<u8>> {
        match self.exchange(command, Expect::Block).await? {
            Some(Reply::Block(payload)) => Ok(payload),
            Some(Reply::Line(text)) => Err(Error::Protocol(format!(
                "expected a binary block from '{command}', got '{text}'"
            ))),
            None => Err(Error::Timeout),
        }
    }

    /// Send `command`, `join`, then `payload` framed as a block.
    ///
    /// Acknowledged like [`write`](Self::write) when `read_after_write` is
    /// enabled.
    pub async fn write_bytes(
        &self,
        command: &str,
        join: &str,
        payload: &[u8],
    ) -> Result<Option<String>> {
        let frame = protocol::encode_block_command(
            command,
            join,
            payload,
            &self.session.write_terminator,
        );
        let mut transport = self.session.transport.lock().await;
        self.discard_stale(&mut **transport, command).await?;

        debug!(command = %command, bytes = payload.len(), "Sending block");
        if let Err(e) = transport.send(&frame).await {
            self.emit_error(command, &e);
            return Err(e);
        }
        self.emit(InstrumentEvent::CommandSent {
            command: format!("{command}{join}<block {} bytes>", payload.len()),
        });

        if !self.read_after_write() {
            return Ok(None);
        }
        let ack = match self.read_reply(&mut **transport, command, Expect::Line).await? {
            Reply::Line(text) => text,
            Reply::Block(payload) => String::from_utf8_lossy(&payload).into_owned(),
        };
        if is_error_reply(&ack) {
            warn!(command = %command, reply = %ack, "Instrument rejected block");
        }
        Ok(Some(ack))
    }

    /// Read one reply line without sending anything.
    pub async fn read(&self) -> Result<String> {
        let mut transport = self.session.transport.lock().await;
        match self.read_reply(&mut **transport, "<read>", Expect::Line).await? {
            Reply::Line(text) => Ok(text),
            Reply::Block(payload) => Ok(String::from_utf8_lossy(&payload).into_owned()),
        }
    }

    /// Close the transport. Further commands fail with `NotConnected`.
    pub async fn close(&self) -> Result<()> {
        let mut transport = self.session.transport.lock().await;
        transport.close().await?;
        self.emit(InstrumentEvent::Disconnected);
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.session.transport.lock().await.is_connected()
    }

    // -----------------------------------------------------------------
    // IEEE-488.2 common commands
    // -----------------------------------------------------------------

    /// Raw `*IDN?` reply.
    pub async fn idn(&self) -> Result<String> {
        self.query("*IDN?").await
    }

    /// Parsed `*IDN?` reply.
    pub async fn identify(&self) -> Result<Identity> {
        Identity::parse(&self.idn().await?)
    }

    /// `*RST`
    pub async fn reset(&self) -> Result<()> {
        self.write("*RST").await.map(drop)
    }

    /// `*CLS`
    pub async fn clear_status(&self) -> Result<()> {
        self.write("*CLS").await.map(drop)
    }

    /// `*OPC`: set the OPC bit in the event status register when pending
    /// operations finish.
    pub async fn set_operation_complete(&self) -> Result<()> {
        self.write("*OPC").await.map(drop)
    }

    /// `*OPC?`: wait until pending operations finish.
    pub async fn operation_complete(&self) -> Result<()> {
        let reply = self.query("*OPC?").await?;
        match parse_int(&reply)? {
            1 => Ok(()),
            other => Err(Error::Protocol(format!("unexpected *OPC? reply: {other}"))),
        }
    }

    /// `*WAI`
    pub async fn wait(&self) -> Result<()> {
        self.write("*WAI").await.map(drop)
    }

    /// `*TST?`: run the self test. Zero means passed.
    pub async fn self_test(&self) -> Result<i64> {
        parse_int(&self.query("*TST?").await?)
    }

    /// `*ESR?`: read and clear the standard event status register.
    pub async fn event_status(&self) -> Result<EventStatus> {
        let value = parse_int(&self.query("*ESR?").await?)?;
        u8::try_from(value)
            .map(EventStatus)
            .map_err(|_| Error::Parse(format!("*ESR? value {value} out of range")))
    }

    /// `*STB?`: the status byte.
    pub async fn status_byte(&self) -> Result<u8> {
        let value = parse_int(&self.query("*STB?").await?)?;
        u8::try_from(value).map_err(|_| Error::Parse(format!("*STB? value {value} out of range")))
    }

    /// `*ESE <mask>`
    pub async fn set_event_status_enable(&self, mask: u8) -> Result<()> {
        self.write(&format!("*ESE {mask}")).await.map(drop)
    }

    /// Drain the `SYST:ERR?` queue.
    ///
    /// Stops at the first reply starting with `0,` (or `+0,`) or containing
    /// "no error", or after [`MAX_ERROR_QUEUE_ENTRIES`] entries. Each entry
    /// is logged at `warn!`.
    pub async fn check_error_queue(&self) -> Result<Vec<String>> {
        let mut errors = Vec::new();
        for _ in 0..MAX_ERROR_QUEUE_ENTRIES {
            let reply = self.query("SYST:ERR?").await?;
            if is_empty_queue_reply(&reply) {
                return Ok(errors);
            }
            warn!(error = %reply, "Instrument error queue entry");
            errors.push(reply);
        }
        warn!(
            count = errors.len(),
            "Error queue did not report empty; giving up"
        );
        Ok(errors)
    }

    // -----------------------------------------------------------------
    // Exchange plumbing
    // -----------------------------------------------------------------

    async fn exchange(&self, command: &str, expect: Expect) -> Result<Option<Reply>> {
        let frame = protocol::encode_command(command, &self.session.write_terminator);
        let mut transport = self.session.transport.lock().await;
        self.discard_stale(&mut **transport, command).await?;

        debug!(command = %command, "SCPI send");
        if let Err(e) = transport.send(&frame).await {
            self.emit_error(command, &e);
            return Err(e);
        }
        self.emit(InstrumentEvent::CommandSent {
            command: command.to_string(),
        });

        if expect == Expect::Nothing {
            return Ok(None);
        }
        self.read_reply(&mut **transport, command, expect)
            .await
            .map(Some)
    }

    /// Throw away bytes already waiting on the link so they cannot be read
    /// as the reply to `command`.
    ///
    /// Normally this only takes what is buffered. After a failed exchange
    /// the late reply may still be on its way, so it is given up to
    /// [`STALE_REPLY_GRACE`] (capped by the command timeout) to arrive.
    async fn discard_stale(&self, transport: &mut dyn Transport, command: &str) -> Result<()> {
        let mut window = if self.session.stale.swap(false, Ordering::Relaxed) {
            self.session.command_timeout.min(STALE_REPLY_GRACE)
        } else {
            Duration::ZERO
        };
        let mut buf = [0u8; 4096];
        let mut discarded = Vec::new();

        while discarded.len() < MAX_BLOCK_REPLY {
            match transport.receive(&mut buf, window).await {
                Ok(n) => {
                    discarded.extend_from_slice(&buf[..n]);
                    window = Duration::ZERO;
                }
                Err(Error::Timeout) => break,
                Err(e) => {
                    self.emit_error(command, &e);
                    return Err(e);
                }
            }
        }

        if !discarded.is_empty() {
            let preview = String::from_utf8_lossy(&discarded[..discarded.len().min(80)]);
            warn!(
                command = %command,
                bytes = discarded.len(),
                data = %preview.trim_end(),
                "Discarding stale reply before send"
            );
        }
        Ok(())
    }

    /// Accumulate bytes until one reply is framed or the command timeout
    /// elapses.
    async fn read_reply(
        &self,
        transport: &mut dyn Transport,
        command: &str,
        expect: Expect,
    ) -> Result<Reply> {
        let terminator = self.session.read_terminator.as_bytes();
        let deadline = tokio::time::Instant::now() + self.session.command_timeout;
        let mut buf = [0u8; 4096];
        let mut response = Vec::new();

        let result = loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break accept_quiet_block(&response, expect);
            }

            match transport.receive(&mut buf, remaining).await {
                Ok(n) => {
                    response.extend_from_slice(&buf[..n]);
                    match protocol::decode_response(&response, terminator) {
                        Ok(DecodeResult::Line { text, consumed }) => {
                            warn_leftover(command, response.len() - consumed);
                            break Ok(Reply::Line(text));
                        }
                        Ok(DecodeResult::Block { payload, consumed }) => {
                            warn_leftover(command, response.len() - consumed);
                            break Ok(Reply::Block(payload));
                        }
                        Ok(DecodeResult::Incomplete) => {
                            if let Err(e) = check_reply_size(&response) {
                                break Err(e);
                            }
                        }
                        Err(e) => break Err(e),
                    }
                }
                Err(Error::Timeout) => break accept_quiet_block(&response, expect),
                Err(e) => break Err(e),
            }
        };

        match &result {
            Ok(Reply::Line(text)) => {
                debug!(command = %command, response = %text, "SCPI reply");
                self.emit(InstrumentEvent::ResponseReceived {
                    command: command.to_string(),
                    response: text.clone(),
                });
            }
            Ok(Reply::Block(payload)) => {
                debug!(command = %command, bytes = payload.len(), "SCPI block reply");
                self.emit(InstrumentEvent::BlockReceived {
                    command: command.to_string(),
                    len: payload.len(),
                });
            }
            Err(e) => {
                self.session.stale.store(true, Ordering::Relaxed);
                self.emit_error(command, e);
            }
        }
        result
    }

    fn emit(&self, event: InstrumentEvent) {
        // No subscribers is fine.
        let _ = self.session.event_tx.send(event);
    }

    fn emit_error(&self, command: &str, e: &Error) {
        debug!(command = %command, error = %e, "SCPI exchange failed");
        self.emit(InstrumentEvent::Error {
            command: command.to_string(),
            message: e.to_string(),
        });
    }
}

/// After the reply went quiet: a complete block lacking only its trailing
/// terminator is accepted; anything else is a timeout.
fn accept_quiet_block(response: &[u8], expect: Expect) -> Result<Reply> {
    if expect == Expect::Block && !response.is_empty() {
        if let Ok(payload) = block::parse_block(response) {
            return Ok(Reply::Block(payload.to_vec()));
        }
    }
    Err(Error::Timeout)
}

/// Reject a partial reply that has outgrown its limit: [`MAX_LINE_REPLY`]
/// for text, or a block header announcing more than [`MAX_BLOCK_REPLY`].
fn check_reply_size(response: &[u8]) -> Result<()> {
    if response.first() == Some(&block::BLOCK_MARKER)
        && response.get(1).is_some_and(u8::is_ascii_digit)
    {
        if let Some(header) = block::parse_header(response)? {
            if header.payload_len > MAX_BLOCK_REPLY {
                return Err(Error::Protocol(format!(
                    "block of {} bytes exceeds the {MAX_BLOCK_REPLY} byte limit",
                    header.payload_len
                )));
            }
        }
        return Ok(());
    }
    if response.len() > MAX_LINE_REPLY {
        return Err(Error::Protocol(format!(
            "reply exceeds {MAX_LINE_REPLY} bytes without a terminator"
        )));
    }
    Ok(())
}

fn warn_leftover(command: &str, extra: usize) {
    if extra > 0 {
        warn!(command = %command, bytes = extra, "Discarding bytes after reply");
    }
}

/// Parse an integer reply such as `1`, `+0`, or `+1.0E+00`.
pub(crate) fn parse_int(reply: &str) -> Result<i64> {
    let s = reply.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Ok(v);
    }
    match s.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
        _ => Err(Error::Parse(format!("expected an integer, got '{s}'"))),
    }
}

fn is_empty_queue_reply(reply: &str) -> bool {
    let r = reply.trim();
    r.starts_with("0,") || r.starts_with("+0,") || r.to_ascii_lowercase().contains("no error")
}

fn is_error_reply(reply: &str) -> bool {
    let upper = reply.trim().to_ascii_uppercase();
    upper.starts_with("ERR") || upper.contains("INVALID")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use metrlib_test_harness::MockTransport;
    use std::collections::VecDeque;

    fn instrument(mock: &MockTransport) -> ScpiInstrument {
        ScpiInstrument::new(Box::new(mock.clone()), ScpiConfig::default())
    }

    #[tokio::test]
    async fn write_sends_terminated_line() {
        let mock = MockTransport::new();
        mock.expect_write(":TIMebase:SCALe 0.001");
        let inst = instrument(&mock);

        assert_eq!(inst.write(":TIMebase:SCALe 0.001").await.unwrap(), None);
        assert_eq!(mock.sent_data(), vec![b":TIMebase:SCALe 0.001\n".to_vec()]);
    }

    #[tokio::test]
    async fn query_returns_trimmed_line() {
        let mock = MockTransport::new();
        mock.expect(b":CH1:FREQ?\n", b"2105000000\r\n");
        let inst = instrument(&mock);

        assert_eq!(inst.query(":CH1:FREQ?").await.unwrap(), "2105000000");
    }

    #[tokio::test]
    async fn query_without_reply_times_out() {
        let mock = MockTransport::new();
        mock.expect_write("*IDN?");
        let inst = instrument(&mock);

        assert!(matches!(inst.query("*IDN?").await, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn read_after_write_returns_ack() {
        let mock = MockTransport::new();
        mock.expect_query(":CH1:PWR:5dBm", "Power Set");
        mock.expect_query(":CH1:FOO:1", "Invalid Command");
        let inst = ScpiInstrument::new(
            Box::new(mock.clone()),
            ScpiConfig {
                read_after_write: true,
                ..Default::default()
            },
        );

        assert_eq!(
            inst.write(":CH1:PWR:5dBm").await.unwrap().as_deref(),
            Some("Power Set")
        );
        // Error acknowledgements are returned, not raised.
        assert_eq!(
            inst.write(":CH1:FOO:1").await.unwrap().as_deref(),
            Some("Invalid Command")
        );
    }

    #[tokio::test]
    async fn read_after_write_toggles_at_runtime() {
        let mock = MockTransport::new();
        mock.expect_write("*CLS");
        mock.expect_query("*CLS", "OK");
        let inst = instrument(&mock);

        assert_eq!(inst.write("*CLS").await.unwrap(), None);
        inst.set_read_after_write(true);
        assert_eq!(inst.write("*CLS").await.unwrap().as_deref(), Some("OK"));
    }

    #[tokio::test]
    async fn query_bytes_returns_block_payload() {
        let mock = MockTransport::new();
        mock.expect(b":WAVeform:DATA?\n", b"#13\x80\x8a\x76\n");
        let inst = instrument(&mock);

        assert_eq!(
            inst.query_bytes(":WAVeform:DATA?").await.unwrap(),
            vec![0x80, 0x8a, 0x76]
        );
    }

    #[tokio::test]
    async fn block_without_terminator_is_accepted_when_quiet() {
        let mock = MockTransport::new();
        mock.expect(b":DISPlay:DATA?\n", b"#14\n\n\n\n");
        let inst = instrument(&mock);

        assert_eq!(
            inst.query_bytes(":DISPlay:DATA?").await.unwrap(),
            b"\n\n\n\n".to_vec()
        );
    }

    #[tokio::test]
    async fn query_bytes_rejects_text_reply() {
        let mock = MockTransport::new();
        mock.expect_query(":WAVeform:DATA?", "1,2,3");
        let inst = instrument(&mock);

        assert!(matches!(
            inst.query_bytes(":WAVeform:DATA?").await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn write_bytes_frames_payload() {
        let mock = MockTransport::new();
        mock.expect(b":WGEN:ARB:DATA #13abc\n", b"");
        let inst = instrument(&mock);

        assert_eq!(
            inst.write_bytes(":WGEN:ARB:DATA", " ", b"abc").await.unwrap(),
            None
        );
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn write_bytes_reads_ack_when_enabled() {
        let mock = MockTransport::new();
        mock.expect(b":DATA #13abc\n", b"OK\n");
        mock.expect_query(":X?", "5");
        let inst = ScpiInstrument::new(
            Box::new(mock.clone()),
            ScpiConfig {
                read_after_write: true,
                ..Default::default()
            },
        );

        assert_eq!(
            inst.write_bytes(":DATA", " ", b"abc").await.unwrap().as_deref(),
            Some("OK")
        );
        assert_eq!(inst.query(":X?").await.unwrap(), "5");
    }

    #[tokio::test]
    async fn unread_reply_is_discarded_before_next_command() {
        let mock = MockTransport::new();
        // Answers a write the session does not read back.
        mock.expect(b"*CLS\n", b"OK\n");
        mock.expect_query(":X?", "5");
        let inst = instrument(&mock);

        assert_eq!(inst.write("*CLS").await.unwrap(), None);
        assert_eq!(inst.query(":X?").await.unwrap(), "5");
    }

    /// Replies to each send after a scripted delay, the way a slow
    /// instrument does.
    struct DelayedTransport {
        script: VecDeque<(Duration, Vec<u8>)>,
        in_flight: VecDeque<(tokio::time::Instant, Vec<u8>)>,
    }

    impl DelayedTransport {
        fn new(script: &[(u64, &str)]) -> Self {
            DelayedTransport {
                script: script
                    .iter()
                    .map(|(ms, reply)| (Duration::from_millis(*ms), format!("{reply}\n").into_bytes()))
                    .collect(),
                in_flight: VecDeque::new(),
            }
        }
    }

    #[async_trait]
    impl Transport for DelayedTransport {
        async fn send(&mut self, _data: &[u8]) -> Result<()> {
            let (delay, reply) = self
                .script
                .pop_front()
                .ok_or_else(|| Error::Protocol("unscripted send".into()))?;
            self.in_flight
                .push_back((tokio::time::Instant::now() + delay, reply));
            Ok(())
        }

        async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
            let deadline = tokio::time::Instant::now() + timeout;
            match self.in_flight.front() {
                Some((ready_at, _)) if *ready_at <= deadline => {
                    tokio::time::sleep_until(*ready_at).await;
                }
                _ => {
                    tokio::time::sleep_until(deadline).await;
                    return Err(Error::Timeout);
                }
            }
            let Some((_, reply)) = self.in_flight.pop_front() else {
                return Err(Error::Timeout);
            };
            buf[..reply.len()].copy_from_slice(&reply);
            Ok(reply.len())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn late_reply_is_not_taken_by_next_query() {
        let transport = DelayedTransport::new(&[(150, "1"), (10, "4,0,1000,1,1e-6,0,0,0.01,0,128")]);
        let inst = ScpiInstrument::new(
            Box::new(transport),
            ScpiConfig {
                command_timeout: Duration::from_millis(100),
                ..Default::default()
            },
        );

        assert!(matches!(inst.query("*OPC?").await, Err(Error::Timeout)));
        assert_eq!(
            inst.query(":WAVeform:PREamble?").await.unwrap(),
            "4,0,1000,1,1e-6,0,0,0.01,0,128"
        );
    }

    #[tokio::test]
    async fn unterminated_reply_is_capped() {
        let mock = MockTransport::new();
        mock.expect(b"*IDN?\n", &vec![b'A'; MAX_LINE_REPLY + 1]);
        let inst = instrument(&mock);

        assert!(matches!(inst.query("*IDN?").await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn oversized_block_header_is_rejected() {
        let mock = MockTransport::new();
        mock.expect(b":WAVeform:DATA?\n", b"#9999999999\x00\x01");
        let inst = instrument(&mock);

        assert!(matches!(
            inst.query_bytes(":WAVeform:DATA?").await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn identify_parses_idn() {
        let mock = MockTransport::new();
        mock.expect_query("*IDN?", "KEYSIGHT TECHNOLOGIES,DSO-X 1204G,CN60000001,02.12");
        let inst = instrument(&mock);

        let id = inst.identify().await.unwrap();
        assert_eq!(id.model, "DSO-X 1204G");
        assert_eq!(id.serial, "CN60000001");
    }

    #[tokio::test]
    async fn common_commands() {
        let mock = MockTransport::new();
        mock.expect_write("*RST");
        mock.expect_write("*CLS");
        mock.expect_query("*OPC?", "1");
        mock.expect_query("*TST?", "+0");
        mock.expect_query("*ESR?", "+33");
        mock.expect_query("*STB?", "64");
        mock.expect_write("*ESE 60");
        mock.expect_write("*WAI");
        mock.expect_write("*OPC");
        let inst = instrument(&mock);

        inst.reset().await.unwrap();
        inst.clear_status().await.unwrap();
        inst.operation_complete().await.unwrap();
        assert_eq!(inst.self_test().await.unwrap(), 0);
        let esr = inst.event_status().await.unwrap();
        assert!(esr.operation_complete());
        assert!(esr.contains(EventStatus::CME));
        assert_eq!(inst.status_byte().await.unwrap(), 64);
        inst.set_event_status_enable(60).await.unwrap();
        inst.wait().await.unwrap();
        inst.set_operation_complete().await.unwrap();
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn operation_complete_rejects_other_values() {
        let mock = MockTransport::new();
        mock.expect_query("*OPC?", "0");
        let inst = instrument(&mock);

        assert!(matches!(
            inst.operation_complete().await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn error_queue_drains_until_empty() {
        let mock = MockTransport::new();
        mock.expect_query("SYST:ERR?", "-113,\"Undefined header\"");
        mock.expect_query("SYST:ERR?", "-222,\"Data out of range\"");
        mock.expect_query("SYST:ERR?", "+0,\"No error\"");
        let inst = instrument(&mock);

        let errors = inst.check_error_queue().await.unwrap();
        assert_eq!(
            errors,
            vec!["-113,\"Undefined header\"", "-222,\"Data out of range\""]
        );
    }

    #[tokio::test]
    async fn error_queue_is_capped() {
        let mock = MockTransport::new();
        for _ in 0..MAX_ERROR_QUEUE_ENTRIES {
            mock.expect_query("SYST:ERR?", "-350,\"Queue overflow\"");
        }
        let inst = instrument(&mock);

        let errors = inst.check_error_queue().await.unwrap();
        assert_eq!(errors.len(), MAX_ERROR_QUEUE_ENTRIES);
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn events_follow_exchange() {
        let mock = MockTransport::new();
        mock.expect_query("*IDN?", "A,B,C,D");
        let inst = instrument(&mock);
        let mut events = inst.subscribe();

        inst.idn().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            InstrumentEvent::CommandSent {
                command: "*IDN?".into()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            InstrumentEvent::ResponseReceived {
                command: "*IDN?".into(),
                response: "A,B,C,D".into()
            }
        );
    }

    #[tokio::test]
    async fn close_disconnects() {
        let mock = MockTransport::new();
        let inst = instrument(&mock);
        let mut events = inst.subscribe();

        assert!(inst.is_connected().await);
        inst.close().await.unwrap();
        assert!(!inst.is_connected().await);
        assert_eq!(events.recv().await.unwrap(), InstrumentEvent::Disconnected);
        assert!(matches!(inst.write("*RST").await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn custom_terminators() {
        let mock = MockTransport::new();
        mock.expect(b"*IDN?\r\n", b"X,Y,Z,W\r\n");
        let inst = ScpiInstrument::new(
            Box::new(mock.clone()),
            ScpiConfig {
                write_terminator: "\r\n".into(),
                read_terminator: "\r\n".into(),
                ..Default::default()
            },
        );

        assert_eq!(inst.idn().await.unwrap(), "X,Y,Z,W");
    }

    #[test]
    fn int_reply_forms() {
        assert_eq!(parse_int("1").unwrap(), 1);
        assert_eq!(parse_int("+0").unwrap(), 0);
        assert_eq!(parse_int("+1.0E+01").unwrap(), 10);
        assert!(matches!(parse_int("1.5"), Err(Error::Parse(_))));
        assert!(matches!(parse_int("ON"), Err(Error::Parse(_))));
    }

    #[test]
    fn error_reply_detection() {
        assert!(is_error_reply("Invalid Command"));
        assert!(is_error_reply("ERROR: out of range"));
        assert!(!is_error_reply("Power Set"));
        assert!(is_empty_queue_reply("0,\"No error\""));
        assert!(is_empty_queue_reply("+0,\"No error\""));
        assert!(is_empty_queue_reply("No Error"));
        assert!(!is_empty_queue_reply("-113,\"Undefined header\""));
    }
}
