//! # metrlib -- Asynchronous SCPI Instrument Control
//!
//! `metrlib` is an asynchronous Rust library for driving test-and-measurement
//! instruments over SCPI: signal generators, synthesizers, and oscilloscopes
//! on raw sockets or serial ports.
//!
//! ## Quick Start
//!
//! ```no_run
//! use metrlib::{ConnectOptions, Instrument};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // A bare host picks up the model's registered port (9760 here).
//!     let inst = metrlib::connect("HS9002B", "192.168.1.40", &ConnectOptions::default()).await?;
//!     if let Instrument::Hs9000(synth) = inst {
//!         synth.channel(1)?.frequency().set_str("1.5GHz").await?;
//!         synth.channel(1)?.output().set(true).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                           |
//! |------------------------|---------------------------------------------------|
//! | `metrlib-core`         | Errors, transport trait, units, driver registry   |
//! | `metrlib-transport`    | TCP, serial, resource strings, LAN discovery      |
//! | `metrlib-scpi`         | SCPI session, typed properties, subsystem tree    |
//! | `metrlib-holzworth`    | Holzworth HS9000-series synthesizers              |
//! | `metrlib-keysight`     | Keysight DSOX1204G oscilloscope                   |
//! | **`metrlib`**          | This facade crate -- re-exports everything        |
//!
//! ## Feature Flags
//!
//! | Feature     | Enables                              | Default |
//! |-------------|--------------------------------------|---------|
//! | `holzworth` | [`holzworth`] module                 | yes     |
//! | `keysight`  | [`keysight`] module                  | yes     |
//! | `full`      | All instrument backends              | no      |
//!
//! ## Supported Instruments
//!
//! - **Holzworth**: HS9001B through HS9008B
//! - **Keysight**: DSOX1204G
//!
//! The [`DriverRegistry`] also lists legacy HP models (HP8563A, HP8564E,
//! HP8657B, HP437B). They are reachable only through VISA and are
//! registered with module [`NO_DRIVER_MODULE`]; [`connect`] reports them as
//! unsupported.

use std::time::Duration;

use tracing::info;

pub use metrlib_core::*;

/// SCPI session, typed properties, and the subsystem tree.
pub mod scpi {
    pub use metrlib_scpi::*;
}

/// Transports, resource strings, and LAN discovery.
pub mod transport {
    pub use metrlib_transport::*;
}

/// Holzworth HS9000 synthesizer backend.
///
/// Provides [`Hs9000`](holzworth::Hs9000) and
/// [`Hs9000Builder`](holzworth::Hs9000Builder).
#[cfg(feature = "holzworth")]
pub mod holzworth {
    pub use metrlib_holzworth::*;
}

/// Keysight InfiniiVision oscilloscope backend.
///
/// Provides [`Dsox1204g`](keysight::Dsox1204g),
/// [`Dsox1204gBuilder`](keysight::Dsox1204gBuilder), and waveform decoding.
#[cfg(feature = "keysight")]
pub mod keysight {
    pub use metrlib_keysight::*;
}

/// Returns every instrument model with a driver in the enabled backends.
///
/// # Example
///
/// ```
/// for inst in metrlib::supported_instruments() {
///     println!("{} {} ({})", inst.manufacturer, inst.model_name, inst.kind);
/// }
/// ```
pub fn supported_instruments() -> Vec<InstrumentDefinition> {
    #[allow(unused_mut)]
    let mut instruments = Vec::new();

    #[cfg(feature = "holzworth")]
    {
        instruments.extend(
            holzworth::models::all_models()
                .iter()
                .map(InstrumentDefinition::from),
        );
    }

    #[cfg(feature = "keysight")]
    {
        instruments.extend(
            keysight::models::all_models()
                .iter()
                .map(InstrumentDefinition::from),
        );
    }

    instruments
}

// ---------------------------------------------------------------------------
// Registry-driven connection
// ---------------------------------------------------------------------------

/// Settings applied by [`connect`] and [`connect_with_transport`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Model lookup table (default: [`DriverRegistry::builtin`]).
    pub registry: DriverRegistry,
    /// Read an acknowledgement after every write.
    pub read_after_write: bool,
    /// Reply timeout per command.
    pub command_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Baud rate for serial resources that do not name one.
    pub baud_rate: u32,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            registry: DriverRegistry::builtin(),
            read_after_write: false,
            command_timeout: metrlib_scpi::instrument::DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: Duration::from_secs(5),
            baud_rate: metrlib_transport::SerialConfig::default().baud_rate,
        }
    }
}

/// A connected instrument of any supported model.
#[derive(Debug)]
#[non_exhaustive]
pub enum Instrument {
    #[cfg(feature = "holzworth")]
    Hs9000(holzworth::Hs9000),
    #[cfg(feature = "keysight")]
    Dsox1204g(keysight::Dsox1204g),
}

impl Instrument {
    /// The underlying SCPI session.
    pub fn scpi(&self) -> &metrlib_scpi::ScpiInstrument {
        match *self {
            #[cfg(feature = "holzworth")]
            Instrument::Hs9000(ref synth) => synth.instrument(),
            #[cfg(feature = "keysight")]
            Instrument::Dsox1204g(ref scope) => scope.instrument(),
        }
    }

    pub fn info(&self) -> InstrumentDefinition {
        match *self {
            #[cfg(feature = "holzworth")]
            Instrument::Hs9000(ref synth) => synth.info(),
            #[cfg(feature = "keysight")]
            Instrument::Dsox1204g(ref scope) => scope.info(),
        }
    }

    pub async fn close(&self) -> Result<()> {
        self.scpi().close().await
    }
}

/// Resolve `resource` for `model` and open a transport to it.
///
/// A bare host name takes the registry's socket port for the model, so
/// `"10.0.0.7"` opens port 9760 for an HS9004B and 5025 for a DSOX1204G.
/// Socket and serial resources are checked against the model's registered
/// interfaces.
pub async fn open_transport(
    model: &str,
    resource: &str,
    options: &ConnectOptions,
) -> Result<Box<dyn Transport>> {
    let model = canonical_model(model, &options.registry)?;
    let info = options.registry.get_driver_info(&model)?;
    let mut parsed = metrlib_transport::Resource::parse(resource)?;
    if let Some(port) = info.socket_port {
        let explicit = !metrlib_transport::resource::is_bare_host(resource);
        parsed = parsed.with_default_port(port, explicit);
    }

    let interface = match parsed {
        metrlib_transport::Resource::Socket { .. } => ConnectionType::Socket,
        metrlib_transport::Resource::Serial { .. } => ConnectionType::Serial,
    };
    if !info.interfaces.contains(&interface) {
        return Err(Error::Unsupported(format!(
            "{model} cannot be reached over {interface}"
        )));
    }

    info!(model = %model, resource = %parsed, "Opening instrument");
    parsed.open(options.connect_timeout, options.baud_rate).await
}

/// Open `resource` and build the driver registered for `model`.
pub async fn connect(model: &str, resource: &str, options: &ConnectOptions) -> Result<Instrument> {
    // Reject models without a driver before touching the network.
    driver_for(model, options)?;
    let transport = open_transport(model, resource, options).await?;
    connect_with_transport(model, transport, options).await
}

/// Build the driver registered for `model` on an already open transport.
pub async fn connect_with_transport(
    model: &str,
    transport: Box<dyn Transport>,
    options: &ConnectOptions,
) -> Result<Instrument> {
    #[allow(unused_variables)]
    let (info, canonical) = driver_for(model, options)?;

    match info.module.as_str() {
        #[cfg(feature = "holzworth")]
        "metrlib_holzworth" => {
            let hs_model = holzworth::models::model_by_name(&canonical)
                .ok_or_else(|| Error::UnknownModel(model.to_string()))?;
            let synth = holzworth::Hs9000Builder::new(hs_model)
                .read_after_write(options.read_after_write)
                .command_timeout(options.command_timeout)
                .build_with_transport(transport)
                .await?;
            Ok(Instrument::Hs9000(synth))
        }
        #[cfg(feature = "keysight")]
        "metrlib_keysight" => {
            let scope_model = keysight::models::model_by_name(&canonical)
                .ok_or_else(|| Error::UnknownModel(model.to_string()))?;
            let scope = keysight::Dsox1204gBuilder::new(scope_model)
                .read_after_write(options.read_after_write)
                .command_timeout(options.command_timeout)
                .build_with_transport(transport)
                .await?;
            Ok(Instrument::Dsox1204g(scope))
        }
        module => Err(Error::Unsupported(format!(
            "{model}: driver {module}::{} is not available in this build",
            info.class
        ))),
    }
}

/// The registered spelling of `model`, matched ignoring case.
fn canonical_model(model: &str, registry: &DriverRegistry) -> Result<String> {
    registry
        .models()
        .find(|m| m.eq_ignore_ascii_case(model.trim()))
        .map(str::to_string)
        .ok_or_else(|| Error::UnknownModel(model.to_string()))
}

fn driver_for(model: &str, options: &ConnectOptions) -> Result<(DriverInfo, String)> {
    let canonical = canonical_model(model, &options.registry)?;
    let info = options.registry.get_driver_info(&canonical)?;
    if !info.has_driver() {
        return Err(Error::Unsupported(format!(
            "{canonical}: listed in the registry but has no driver"
        )));
    }
    match info.module.as_str() {
        #[cfg(feature = "holzworth")]
        "metrlib_holzworth" => Ok((info, canonical)),
        #[cfg(feature = "keysight")]
        "metrlib_keysight" => Ok((info, canonical)),
        module => Err(Error::Unsupported(format!(
            "{canonical}: driver {module}::{} is not available in this build",
            info.class
        ))),
    }
}

#[cfg(all(test, feature = "holzworth", feature = "keysight"))]
mod tests {
    use super::*;
    use metrlib_test_harness::{MockTcpServer, MockTransport};

    #[test]
    fn supported_instruments_lists_every_backend() {
        let all = supported_instruments();
        assert_eq!(all.len(), 9);
        assert!(all.iter().any(|i| i.model_name == "HS9008B" && i.channels == 8));
        assert!(
            all.iter()
                .any(|i| i.model_name == "DSOX1204G" && i.kind == InstrumentKind::Oscilloscope)
        );
    }

    #[test]
    fn every_supported_model_is_registered() {
        let registry = DriverRegistry::builtin();
        for inst in supported_instruments() {
            let info = registry.get_driver_info(inst.model_name).unwrap();
            assert_eq!(info.socket_port, inst.socket_port, "{}", inst.model_name);
        }
    }

    #[tokio::test]
    async fn connect_with_transport_picks_driver() {
        let options = ConnectOptions::default();

        let synth = connect_with_transport("hs9003b", Box::new(MockTransport::new()), &options)
            .await
            .unwrap();
        assert!(matches!(&synth, Instrument::Hs9000(s) if s.channels().len() == 3));

        let scope = connect_with_transport("DSOX1204G", Box::new(MockTransport::new()), &options)
            .await
            .unwrap();
        assert_eq!(scope.info().manufacturer, Manufacturer::Keysight);
    }

    #[tokio::test]
    async fn legacy_and_unknown_models_rejected() {
        let options = ConnectOptions::default();
        let result = connect("HP8657B", "127.0.0.1", &options).await;
        assert!(matches!(result, Err(Error::Unsupported(_))));

        let result = connect_with_transport("XYZ-1", Box::new(MockTransport::new()), &options).await;
        assert!(matches!(result, Err(Error::UnknownModel(_))));
    }

    #[tokio::test]
    async fn serial_rejected_for_socket_only_model() {
        let result = open_transport(
            "DSOX1204G",
            "serial:/dev/ttyUSB0",
            &ConnectOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[tokio::test]
    async fn connect_over_tcp_with_explicit_port() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect_query(":CH1:FREQ?", "1000000000Hz");
        let port = server.port();
        server.start();

        let inst = connect(
            "HS9001B",
            &format!("127.0.0.1:{port}"),
            &ConnectOptions::default(),
        )
        .await
        .unwrap();
        let Instrument::Hs9000(synth) = &inst else {
            panic!("expected an HS9000");
        };
        let freq = synth.channel(1).unwrap().frequency().get().await.unwrap();
        assert_eq!(freq, 1e9);
        inst.close().await.unwrap();
        server.wait().await.unwrap();
    }
}
