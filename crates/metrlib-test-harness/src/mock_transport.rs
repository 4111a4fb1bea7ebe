//! Scripted in-memory transport for driver tests.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs, so SCPI command construction and reply parsing
//! can be tested without an instrument.
//!
//! The mock is a cheap handle over shared state: clone it, hand one clone
//! to the instrument as a `Box<dyn Transport>`, and keep the other to
//! inspect what was sent.
//!
//! # Example
//!
//! ```
//! use metrlib_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! mock.expect_query("*IDN?", "Holzworth Instrumentation,HS9004B,0142,2.10");
//! mock.expect_write(":CH1:FREQ:2100000000Hz");
//! assert_eq!(mock.remaining_expectations(), 2);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use metrlib_core::error::{Error, Result};
use metrlib_core::transport::Transport;

#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// The bytes to return when the matching request is received.
    response: Vec<u8>,
}

#[derive(Debug)]
struct State {
    expectations: VecDeque<Expectation>,
    /// Reply bytes not yet handed out by `receive()`.
    pending: VecDeque<u8>,
    connected: bool,
    sent_log: Vec<Vec<u8>>,
}

/// A mock [`Transport`] for testing drivers without hardware.
///
/// Expectations are consumed in order. Each `send()` is recorded and must
/// equal the next expectation's request; its response becomes readable by
/// subsequent `receive()` calls. An empty response models a command the
/// instrument does not answer: `receive()` then reports [`Error::Timeout`].
///
/// A mismatched or unexpected `send()` returns [`Error::Protocol`].
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(State {
                expectations: VecDeque::new(),
                pending: VecDeque::new(),
                connected: true,
                sent_log: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread poisons the lock; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an expected request/response pair of raw bytes.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Expect the SCPI line `command` and answer with the line `reply`.
    ///
    /// Both sides are newline-terminated.
    pub fn expect_query(&self, command: &str, reply: &str) {
        self.expect(format!("{command}\n").as_bytes(), format!("{reply}\n").as_bytes());
    }

    /// Expect the SCPI line `command` with no reply.
    pub fn expect_write(&self, command: &str) {
        self.expect(format!("{command}\n").as_bytes(), b"");
    }

    /// All data sent through this transport, one element per `send()`.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.lock().sent_log.clone()
    }

    /// The sent data as text lines with terminators removed.
    pub fn sent_lines(&self) -> Vec<String> {
        self.lock()
            .sent_log
            .iter()
            .map(|bytes| {
                String::from_utf8_lossy(bytes)
                    .trim_end_matches(['\r', '\n'])
                    .to_string()
            })
            .collect()
    }

    /// Number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.lock().expectations.len()
    }

    /// Set the connected state.
    ///
    /// When `false`, `send()` and `receive()` return [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }

        state.sent_log.push(data.to_vec());

        let expectation = state.expectations.pop_front().ok_or_else(|| {
            Error::Protocol(format!(
                "no more expectations in mock transport, got {:?}",
                String::from_utf8_lossy(data)
            ))
        })?;
        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            )));
        }
        state.pending.extend(expectation.response);
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut state = self.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        if state.pending.is_empty() {
            return Err(Error::Timeout);
        }

        let n = state.pending.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(state.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.connected = false;
        state.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }
}
