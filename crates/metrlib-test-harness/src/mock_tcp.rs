//! Scripted TCP instrument for socket-level tests.
//!
//! [`MockTcpServer`] listens on a random localhost port and plays the part
//! of a LAN instrument: it accepts one client and answers each expected
//! request with a scripted reply. Use it to exercise the real
//! `TcpTransport` and resource-opening code end to end.
//!
//! # Example
//!
//! ```
//! use metrlib_test_harness::MockTcpServer;
//!
//! # async fn example() -> metrlib_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//! server.expect_query("*IDN?", "KEYSIGHT TECHNOLOGIES,DSO-X 1204G,CN1,02.12");
//! let addr = server.addr().to_string();
//! server.start();
//! // ... connect a TcpTransport to `addr` ...
//! # Ok(())
//! # }
//! ```

use metrlib_core::error::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
struct TcpExpectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

/// A mock LAN instrument.
///
/// The listener is bound in [`new`](MockTcpServer::new), so clients may
/// connect as soon as [`start`](MockTcpServer::start) returns. A request
/// that does not match the next expectation ends the session with an error
/// reported by [`wait`](MockTcpServer::wait).
pub struct MockTcpServer {
    addr: String,
    listener: Option<TcpListener>,
    expectations: Vec<TcpExpectation>,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind a new mock server on `127.0.0.1` with an OS-assigned port.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {e}")))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            expectations: Vec::new(),
            server_handle: None,
        })
    }

    /// Add an expected request/response pair of raw bytes.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push(TcpExpectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Expect the newline-terminated line `command` and reply with `reply`.
    pub fn expect_query(&mut self, command: &str, reply: &str) {
        self.expect(format!("{command}\n").as_bytes(), format!("{reply}\n").as_bytes());
    }

    /// Expect the newline-terminated line `command` with no reply.
    pub fn expect_write(&mut self, command: &str) {
        self.expect(format!("{command}\n").as_bytes(), b"");
    }

    /// The `host:port` address the server listens on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The port the server listens on.
    pub fn port(&self) -> u16 {
        self.addr
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or_default()
    }

    /// Spawn the server task. It accepts a single client and processes all
    /// expectations in order.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            tracing::warn!(addr = %self.addr, "MockTcpServer already started");
            return;
        };
        let expectations = std::mem::take(&mut self.expectations);

        self.server_handle = Some(tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {e}"))?;
            serve(&mut stream, &expectations).await
        }));
    }

    /// Wait for the server task to finish and report any mismatch.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {e}"))?,
            None => Ok(()),
        }
    }
}

async fn serve(
    stream: &mut TcpStream,
    expectations: &[TcpExpectation],
) -> std::result::Result<(), String> {
    for (i, expectation) in expectations.iter().enumerate() {
        let mut buf = vec![0u8; expectation.request.len()];
        stream.read_exact(&mut buf).await.map_err(|e| {
            format!(
                "expectation {i}: failed reading {} bytes: {e}",
                expectation.request.len()
            )
        })?;

        if buf != expectation.request {
            return Err(format!(
                "expectation {i}: request mismatch: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(&buf)
            ));
        }

        if !expectation.response.is_empty() {
            stream
                .write_all(&expectation.response)
                .await
                .map_err(|e| format!("expectation {i}: write error: {e}"))?;
            stream
                .flush()
                .await
                .map_err(|e| format!("expectation {i}: flush error: {e}"))?;
        }
    }
    Ok(())
}
