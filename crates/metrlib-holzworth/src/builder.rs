//! Hs9000Builder -- fluent builder for constructing [`Hs9000`] instances.
//!
//! Separates configuration from construction so that callers can pick the
//! interface, timeouts, and acknowledgement mode before the connection is
//! opened.
//!
//! # Example
//!
//! ```no_run
//! use metrlib_holzworth::builder::Hs9000Builder;
//! use metrlib_holzworth::models::hs9002b;
//! use std::time::Duration;
//!
//! # async fn example() -> metrlib_core::Result<()> {
//! let synth = Hs9000Builder::new(hs9002b())
//!     .serial_port("/dev/ttyACM0")
//!     .read_after_write(true)
//!     .command_timeout(Duration::from_secs(1))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use metrlib_core::error::{Error, Result};
use metrlib_core::transport::Transport;
use metrlib_scpi::instrument::DEFAULT_COMMAND_TIMEOUT;
use metrlib_scpi::{ScpiConfig, ScpiInstrument};
use metrlib_transport::{SerialConfig, SerialTransport, TcpTransport};
use tracing::{debug, info};

use crate::models::{HS9000_SOCKET_PORT, Hs9000Model};
use crate::synth::Hs9000;

/// Fluent builder for [`Hs9000`].
///
/// The channel count defaults to the model's; override it for units with
/// channels disabled or not fitted.
#[derive(Debug, Clone)]
pub struct Hs9000Builder {
    model: Hs9000Model,
    channels: Option<usize>,
    host: Option<String>,
    port: u16,
    serial_port: Option<String>,
    baud_rate: u32,
    read_after_write: bool,
    command_timeout: Duration,
    connect_timeout: Duration,
}

impl Hs9000Builder {
    pub fn new(model: Hs9000Model) -> Self {
        Hs9000Builder {
            model,
            channels: None,
            host: None,
            port: HS9000_SOCKET_PORT,
            serial_port: None,
            baud_rate: SerialConfig::default().baud_rate,
            read_after_write: false,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Override the number of channels built.
    pub fn channels(mut self, count: usize) -> Self {
        self.channels = Some(count);
        self
    }

    /// Connect over the LAN to `host`.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// TCP port (default: 9760).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Connect over USB/serial instead of the LAN.
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Have the unit acknowledge every command, and read the
    /// acknowledgement after each write (default: off).
    pub fn read_after_write(mut self, enabled: bool) -> Self {
        self.read_after_write = enabled;
        self
    }

    /// Reply timeout per command (default: 2.5 s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// TCP connect timeout (default: 5 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build an [`Hs9000`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing (pass a `MockTransport`
    /// from `metrlib-test-harness`). With `read_after_write` enabled the
    /// unit is switched to respond mode before this returns; a unit that
    /// was not yet responding does not acknowledge that first command, so
    /// a timeout on it is expected and ignored.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Hs9000> {
        let channels = self.channels.unwrap_or(usize::from(self.model.channels));
        if channels == 0 {
            return Err(Error::InvalidParameter(
                "an HS9000 needs at least one channel".into(),
            ));
        }

        let config = ScpiConfig {
            command_timeout: self.command_timeout,
            read_after_write: self.read_after_write,
            ..ScpiConfig::default()
        };
        let synth = Hs9000::new(ScpiInstrument::new(transport, config), self.model, channels)?;

        if self.read_after_write {
            match synth.communication().respond().set(true).await {
                Ok(()) => {}
                Err(Error::Timeout) => {
                    debug!("No acknowledgement for respond mode; unit was not responding yet");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(synth)
    }

    /// Build an [`Hs9000`], opening TCP to [`host`](Self::host) or the
    /// [`serial_port`](Self::serial_port).
    pub async fn build(self) -> Result<Hs9000> {
        let transport: Box<dyn Transport> = match (&self.host, &self.serial_port) {
            (Some(host), None) => {
                let addr = format!("{host}:{}", self.port);
                info!(model = self.model.name, addr = %addr, "Connecting to HS9000");
                Box::new(TcpTransport::connect_with_timeout(&addr, self.connect_timeout).await?)
            }
            (None, Some(port)) => {
                info!(model = self.model.name, port = %port, "Opening HS9000 serial port");
                Box::new(SerialTransport::open(port, self.baud_rate).await?)
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidParameter(
                    "set either host or serial_port, not both".into(),
                ));
            }
            (None, None) => {
                return Err(Error::InvalidParameter(
                    "host or serial_port is required for build()".into(),
                ));
            }
        };
        self.build_with_transport(transport).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{hs9002b, hs9004b};
    use metrlib_test_harness::{MockTcpServer, MockTransport};

    #[tokio::test]
    async fn builder_defaults() {
        let mock = MockTransport::new();
        let synth = Hs9000Builder::new(hs9004b())
            .build_with_transport(Box::new(mock.clone()))
            .await
            .unwrap();

        assert_eq!(synth.channels().len(), 4);
        assert!(!synth.instrument().read_after_write());
        assert_eq!(synth.instrument().command_timeout(), DEFAULT_COMMAND_TIMEOUT);
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test]
    async fn channel_override() {
        let synth = Hs9000Builder::new(hs9004b())
            .channels(2)
            .command_timeout(Duration::from_millis(300))
            .build_with_transport(Box::new(MockTransport::new()))
            .await
            .unwrap();

        assert_eq!(synth.channels().len(), 2);
        assert_eq!(synth.info().channels, 2);
        assert_eq!(
            synth.instrument().command_timeout(),
            Duration::from_millis(300)
        );
    }

    #[tokio::test]
    async fn zero_channels_rejected() {
        let result = Hs9000Builder::new(hs9002b())
            .channels(0)
            .build_with_transport(Box::new(MockTransport::new()))
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn read_after_write_enables_respond_first() {
        let mock = MockTransport::new();
        mock.expect_query(":COMM:RESPOND:ON", "OK");
        mock.expect_query(":CH1:PWR:0dBm", "OK");
        let synth = Hs9000Builder::new(hs9002b())
            .read_after_write(true)
            .build_with_transport(Box::new(mock.clone()))
            .await
            .unwrap();

        assert!(synth.instrument().read_after_write());
        synth.channel(1).unwrap().power().set(0.0).await.unwrap();
        assert_eq!(mock.sent_lines(), vec![":COMM:RESPOND:ON", ":CH1:PWR:0dBm"]);
    }

    #[tokio::test]
    async fn read_after_write_tolerates_silent_unit() {
        let mock = MockTransport::new();
        mock.expect_write(":COMM:RESPOND:ON");
        let synth = Hs9000Builder::new(hs9002b())
            .read_after_write(true)
            .build_with_transport(Box::new(mock.clone()))
            .await;

        assert!(synth.is_ok());
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn read_after_write_propagates_other_errors() {
        let mock = MockTransport::new();
        mock.set_connected(false);
        let result = Hs9000Builder::new(hs9002b())
            .read_after_write(true)
            .build_with_transport(Box::new(mock))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn build_requires_an_interface() {
        let result = Hs9000Builder::new(hs9004b()).build().await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));

        let result = Hs9000Builder::new(hs9004b())
            .host("127.0.0.1")
            .serial_port("/dev/ttyACM0")
            .build()
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn build_over_tcp() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect_query("*IDN?", "Holzworth Instrumentation,HS9004B,1234,2.1");
        let port = server.port();
        server.start();

        let synth = Hs9000Builder::new(hs9004b())
            .host("127.0.0.1")
            .port(port)
            .build()
            .await
            .unwrap();
        let id = synth.identify().await.unwrap();
        assert_eq!(id.model, "HS9004B");
        synth.close().await.unwrap();
        server.wait().await.unwrap();
    }
}
