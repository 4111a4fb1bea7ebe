//! Dsox1204gBuilder -- fluent builder for constructing [`Dsox1204g`] instances.
//!
//! # Example
//!
//! ```no_run
//! use metrlib_keysight::builder::Dsox1204gBuilder;
//! use metrlib_keysight::models::dsox1204g;
//! use std::time::Duration;
//!
//! # async fn example() -> metrlib_core::Result<()> {
//! let scope = Dsox1204gBuilder::new(dsox1204g())
//!     .host("192.168.1.50")
//!     .command_timeout(Duration::from_secs(10))
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
use metrlib_transport::{SCPI_RAW_PORT, TcpTransport};
use tracing::info;

use crate::models::ScopeModel;
use crate::scope::Dsox1204g;

/// Fluent builder for [`Dsox1204g`].
#[derive(Debug, Clone)]
pub struct Dsox1204gBuilder {
    model: ScopeModel,
    channels: Option<usize>,
    host: Option<String>,
    port: u16,
    read_after_write: bool,
    command_timeout: Duration,
    connect_timeout: Duration,
}

impl Dsox1204gBuilder {
    pub fn new(model: ScopeModel) -> Self {
        Dsox1204gBuilder {
            model,
            channels: None,
            host: None,
            port: SCPI_RAW_PORT,
            read_after_write: false,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Override the number of analog channels built.
    pub fn channels(mut self, count: usize) -> Self {
        self.channels = Some(count);
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// TCP port (default: 5025).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn read_after_write(mut self, enabled: bool) -> Self {
        self.read_after_write = enabled;
        self
    }

    /// Reply timeout per command (default: 2.5 s). Long records at slow
    /// timebases may need more.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build a [`Dsox1204g`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing. Nothing is sent.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Dsox1204g> {
        let channels = self.channels.unwrap_or(usize::from(self.model.channels));
        if channels == 0 || channels > usize::from(self.model.channels) {
            return Err(Error::InvalidParameter(format!(
                "{} has 1 to {} channels, not {channels}",
                self.model.name, self.model.channels
            )));
        }

        let config = ScpiConfig {
            command_timeout: self.command_timeout,
            read_after_write: self.read_after_write,
            ..ScpiConfig::default()
        };
        Dsox1204g::new(ScpiInstrument::new(transport, config), self.model, channels)
    }

    /// Build a [`Dsox1204g`] over TCP to [`host`](Self::host).
    pub async fn build(self) -> Result<Dsox1204g> {
        let host = self.host.as_deref().ok_or_else(|| {
            Error::InvalidParameter("host is required for build()".into())
        })?;
        let addr = format!("{host}:{}", self.port);
        info!(model = self.model.name, addr = %addr, "Connecting to oscilloscope");
        let transport = TcpTransport::connect_with_timeout(&addr, self.connect_timeout).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dsox1204g;
    use metrlib_test_harness::{MockTcpServer, MockTransport};

    #[tokio::test]
    async fn defaults_build_four_channels() {
        let mock = MockTransport::new();
        let scope = Dsox1204gBuilder::new(dsox1204g())
            .build_with_transport(Box::new(mock.clone()))
            .await
            .unwrap();
        assert_eq!(scope.channels().len(), 4);
        assert_eq!(scope.instrument().command_timeout(), DEFAULT_COMMAND_TIMEOUT);
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test]
    async fn channel_count_bounded_by_model() {
        for count in [0, 5] {
            let result = Dsox1204gBuilder::new(dsox1204g())
                .channels(count)
                .build_with_transport(Box::new(MockTransport::new()))
                .await;
            assert!(matches!(result, Err(Error::InvalidParameter(_))));
        }

        let scope = Dsox1204gBuilder::new(dsox1204g())
            .channels(2)
            .build_with_transport(Box::new(MockTransport::new()))
            .await
            .unwrap();
        assert!(scope.channel(3).is_err());
    }

    #[tokio::test]
    async fn build_requires_host() {
        let result = Dsox1204gBuilder::new(dsox1204g()).build().await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn build_over_tcp() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect_query(
            "*IDN?",
            "KEYSIGHT TECHNOLOGIES,DSO-X 1204G,CN12345678,02.12.2021071625",
        );
        let port = server.port();
        server.start();

        let scope = Dsox1204gBuilder::new(dsox1204g())
            .host("127.0.0.1")
            .port(port)
            .build()
            .await
            .unwrap();
        let id = scope.identify().await.unwrap();
        assert_eq!(id.model, "DSO-X 1204G");
        scope.close().await.unwrap();
        server.wait().await.unwrap();
    }
}
