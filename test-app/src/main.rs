// metrlib test application -- CLI tool for exercising the Holzworth and
// Keysight drivers against real hardware or a mock transport.
//
// Usage:
//   metrlib-test-app list
//   metrlib-test-app --model HS9004B info
//   metrlib-test-app discover
//   metrlib-test-app --model HS9002B --resource 192.168.1.40 idn
//   metrlib-test-app --model HS9002B --resource serial:/dev/ttyACM0 synth freq set 2.1GHz
//   metrlib-test-app --model DSOX1204G --resource 192.168.1.50 scope capture --source CHAN1
//   metrlib-test-app --model DSOX1204G --resource 192.168.1.50 query ":TIMebase:SCALe?"
//   metrlib-test-app --model HS9004B --mock idn

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use rand::Rng;
use tracing::debug;

use metrlib::holzworth::Hs9000;
use metrlib::keysight::{Dsox1204g, WaveformFormat, WaveformSource};
use metrlib::{ConnectOptions, DriverRegistry, Instrument, InstrumentEvent, format_si};
use metrlib_test_harness::MockTransport;
use metrlib_transport::discovery;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// metrlib test application -- exercises instrument drivers from the command line.
#[derive(Parser)]
#[command(name = "metrlib-test-app", version, about)]
struct Cli {
    /// Instrument model (e.g. HS9004B, DSOX1204G).
    /// Required for all commands except `list` and `discover`.
    #[arg(long)]
    model: Option<String>,

    /// Instrument address: host, host:port, TCPIP::host::port::SOCKET,
    /// ASRL/dev/ttyUSB0::INSTR, or serial:/dev/ttyACM0@115200.
    /// A bare host uses the model's registered port.
    #[arg(long)]
    resource: Option<String>,

    /// Use a mock transport instead of a real connection.
    /// Useful for verifying CLI parsing and driver wiring without hardware.
    #[arg(long)]
    mock: bool,

    /// Read an acknowledgement after every write.
    #[arg(long)]
    read_after_write: bool,

    /// Reply timeout per command in milliseconds.
    #[arg(long, default_value_t = 2500)]
    timeout_ms: u64,

    /// Extra driver registry (TOML) merged over the built-in table.
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Log every command and reply.
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List instrument models with a driver, and every registered model.
    List,

    /// Print the registry entry for --model.
    Info,

    /// Find instruments on the LAN by Microchip UDP discovery.
    Discover {
        /// How long to collect replies, in milliseconds.
        #[arg(long, default_value_t = 2000)]
        wait_ms: u64,
    },

    /// Query and parse *IDN?.
    Idn,

    /// Drain the SYSTem:ERRor? queue.
    Errors,

    /// Send a raw query and print the reply.
    Query { command: String },

    /// Send a raw command.
    Write { command: String },

    /// Holzworth synthesizer operations.
    Synth {
        /// Channel number (1-based).
        #[arg(long, default_value_t = 1)]
        channel: usize,

        #[command(subcommand)]
        action: SynthAction,
    },

    /// Oscilloscope operations.
    Scope {
        #[command(subcommand)]
        action: ScopeAction,
    },

    /// Rapid set/readback cycles on a synthesizer channel.
    Stress {
        /// Number of cycles.
        #[arg(long, default_value_t = 100)]
        count: u32,

        /// Channel number (1-based).
        #[arg(long, default_value_t = 1)]
        channel: usize,
    },
}

#[derive(Subcommand)]
enum SynthAction {
    /// Frequency: `get`, or `set <value>` with SI suffix (e.g. 2.1GHz).
    Freq {
        #[command(subcommand)]
        action: GetSet,
    },
    /// Power in dBm.
    Power {
        #[command(subcommand)]
        action: GetSet,
    },
    /// RF output state.
    Output {
        #[command(subcommand)]
        action: OnOff,
    },
}

#[derive(Subcommand)]
enum GetSet {
    Get,
    Set { value: String },
}

#[derive(Subcommand)]
enum OnOff {
    Get,
    On,
    Off,
}

#[derive(Subcommand)]
enum ScopeAction {
    /// Digitize and print traces.
    Capture {
        /// Sources to capture (e.g. CHAN1, CHANnel2); defaults to channel 1.
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Transfer encoding.
        #[arg(long, value_enum, default_value_t = TransferFormat::Byte)]
        format: TransferFormat,

        /// Points printed per trace.
        #[arg(long, default_value_t = 10)]
        show: usize,
    },
    /// Autoscale the given sources.
    Autoscale {
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Start continuous acquisition.
    Run,
    /// Stop acquisition.
    Stop,
    /// Arm a single acquisition.
    Single,
}

#[derive(Clone, Copy, ValueEnum)]
enum TransferFormat {
    Byte,
    Word,
    Ascii,
}

impl From<TransferFormat> for WaveformFormat {
    fn from(f: TransferFormat) -> Self {
        match f {
            TransferFormat::Byte => WaveformFormat::Byte,
            TransferFormat::Word => WaveformFormat::Word,
            TransferFormat::Ascii => WaveformFormat::Ascii,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_registry(cli: &Cli) -> Result<DriverRegistry> {
    let mut registry = DriverRegistry::builtin();
    if let Some(path) = &cli.registry {
        let extra = DriverRegistry::load(path)
            .with_context(|| format!("failed to load registry {}", path.display()))?;
        registry.extend(extra);
        registry.validate().context("merged registry is inconsistent")?;
    }
    Ok(registry)
}

fn connect_options(cli: &Cli) -> Result<ConnectOptions> {
    Ok(ConnectOptions {
        registry: load_registry(cli)?,
        read_after_write: cli.read_after_write,
        command_timeout: Duration::from_millis(cli.timeout_ms),
        ..ConnectOptions::default()
    })
}

fn require_model(cli: &Cli) -> Result<&str> {
    cli.model
        .as_deref()
        .context("--model is required for this command")
}

/// A mock that answers *IDN? as the requested model.
fn mock_transport(model: &str) -> MockTransport {
    let mock = MockTransport::new();
    mock.expect_query("*IDN?", &format!("metrlib,{model},MOCK0001,0.0"));
    mock
}

async fn open_instrument(cli: &Cli) -> Result<Instrument> {
    let model = require_model(cli)?;
    let options = connect_options(cli)?;

    let inst = if cli.mock {
        metrlib::connect_with_transport(model, Box::new(mock_transport(model)), &options)
            .await
            .context("failed to build driver with mock transport")?
    } else {
        let resource = cli
            .resource
            .as_deref()
            .context("--resource is required when not using --mock")?;
        metrlib::connect(model, resource, &options)
            .await
            .with_context(|| format!("failed to connect to {model} at {resource}"))?
    };

    let info = inst.info();
    let via = if cli.mock { "mock transport" } else { "resource" };
    println!(
        "Connected ({via}) -- {} {}",
        info.manufacturer, info.model_name
    );

    if cli.verbose {
        let mut events = inst.scpi().subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    InstrumentEvent::CommandSent { command } => eprintln!(">> {command}"),
                    InstrumentEvent::ResponseReceived { response, .. } => {
                        eprintln!("<< {response}")
                    }
                    InstrumentEvent::BlockReceived { len, .. } => eprintln!("<< #block {len} bytes"),
                    InstrumentEvent::Error { command, message } => {
                        eprintln!("!! {command}: {message}")
                    }
                    InstrumentEvent::Disconnected => break,
                }
            }
        });
    }

    Ok(inst)
}

fn as_synth(inst: &Instrument) -> Result<&Hs9000> {
    match inst {
        Instrument::Hs9000(synth) => Ok(synth),
        _ => bail!("this command needs a Holzworth HS9000 synthesizer"),
    }
}

fn as_scope(inst: &mut Instrument) -> Result<&mut Dsox1204g> {
    match inst {
        Instrument::Dsox1204g(scope) => Ok(scope),
        _ => bail!("this command needs a Keysight oscilloscope"),
    }
}

fn parse_sources(names: &[String]) -> Result<Vec<WaveformSource>> {
    names
        .iter()
        .map(|n| n.parse::<WaveformSource>().map_err(anyhow::Error::from))
        .collect()
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_list(registry: &DriverRegistry) -> Result<()> {
    let instruments = metrlib::supported_instruments();

    println!(
        "{:<16}  {:<10}  {:<18}  {:>8}  Port",
        "Manufacturer", "Model", "Kind", "Channels"
    );
    println!(
        "{:<16}  {:<10}  {:<18}  {:>8}  ----",
        "-".repeat(16),
        "-".repeat(10),
        "-".repeat(18),
        "--------"
    );
    for inst in &instruments {
        let port = inst
            .socket_port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<16}  {:<10}  {:<18}  {:>8}  {}",
            inst.manufacturer.to_string(),
            inst.model_name,
            inst.kind.to_string(),
            inst.channels,
            port
        );
    }
    println!();
    println!("{} models with drivers.", instruments.len());

    let registry_only: Vec<&str> = registry
        .models()
        .filter(|m| !instruments.iter().any(|i| i.model_name == *m))
        .collect();
    if !registry_only.is_empty() {
        println!("Registered without a driver: {}", registry_only.join(", "));
    }
    Ok(())
}

fn cmd_info(registry: &DriverRegistry, model: &str) -> Result<()> {
    let info = registry.get_driver_info(model)?;
    println!("Model:       {}", info.model);
    if info.has_driver() {
        println!("Driver:      {}::{}", info.module, info.class);
    } else {
        println!("Driver:      none ({} is listed only)", info.class);
    }
    let interfaces: Vec<String> = info.interfaces.iter().map(|i| i.to_string()).collect();
    println!("Interfaces:  {}", interfaces.join(", "));
    match info.socket_port {
        Some(port) => println!("Socket port: {port}"),
        None => println!("Socket port: -"),
    }
    if let Some(d) = info.discovery {
        println!("Discovery:   {:?} on UDP {}", d.protocol, d.udp_port);
    }
    Ok(())
}

async fn cmd_discover(wait: Duration) -> Result<()> {
    println!(
        "Discovering instruments on the LAN ({:.1} seconds)...",
        wait.as_secs_f64()
    );
    println!();

    let devices = discovery::discover(wait)
        .await
        .context("LAN discovery failed")?;
    if devices.is_empty() {
        println!("No instruments found.");
        return Ok(());
    }

    println!("{:<16}  {:<20}  Reply", "IP Address", "Id");
    println!("{:<16}  {:<20}  -----", "-".repeat(16), "-".repeat(20));
    for dev in &devices {
        println!("{:<16}  {:<20}  {}", dev.ip.to_string(), dev.id, dev.reply);
    }
    println!();
    println!("{} instrument(s) found.", devices.len());
    Ok(())
}

async fn cmd_synth(synth: &Hs9000, channel: usize, action: &SynthAction) -> Result<()> {
    let ch = synth.channel(channel)?;
    match action {
        SynthAction::Freq { action: GetSet::Get } => {
            let hz = ch.frequency().get().await?;
            println!("CH{channel} frequency: {}", format_si(hz, "Hz"));
        }
        SynthAction::Freq {
            action: GetSet::Set { value },
        } => {
            ch.frequency().set_str(value).await?;
            println!("CH{channel} frequency set to {value}");
        }
        SynthAction::Power { action: GetSet::Get } => {
            println!("CH{channel} power: {} dBm", ch.power().get().await?);
        }
        SynthAction::Power {
            action: GetSet::Set { value },
        } => {
            ch.power().set_str(value).await?;
            println!("CH{channel} power set to {value}");
        }
        SynthAction::Output { action: OnOff::Get } => {
            let on = ch.output().get().await?;
            println!("CH{channel} output: {}", if on { "ON" } else { "OFF" });
        }
        SynthAction::Output { action: OnOff::On } => ch.output().set(true).await?,
        SynthAction::Output { action: OnOff::Off } => ch.output().set(false).await?,
    }
    Ok(())
}

async fn cmd_capture(
    scope: &mut Dsox1204g,
    sources: &[String],
    format: TransferFormat,
    show: usize,
) -> Result<()> {
    let sources = parse_sources(sources)?;
    scope.set_data_format(format.into());

    let start = Instant::now();
    let traces = scope.fetch_trace(&sources).await?;
    debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Capture complete");

    for trace in &traces {
        println!();
        println!("{}: {} points", trace.label, trace.values.len());
        if trace.values.is_empty() {
            continue;
        }
        let step = (trace.values.len() / show.max(1)).max(1);
        for (t, v) in trace.time.iter().zip(&trace.values).step_by(step) {
            println!("  {:>14}  {:>12}", format_si(*t, "s"), format_si(*v, "V"));
        }
        let (min, max) = trace
            .values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        println!("  min {}  max {}", format_si(min, "V"), format_si(max, "V"));
    }
    Ok(())
}

async fn cmd_scope(scope: &mut Dsox1204g, action: &ScopeAction) -> Result<()> {
    match action {
        ScopeAction::Capture {
            sources,
            format,
            show,
        } => cmd_capture(scope, sources, *format, *show).await,
        ScopeAction::Autoscale { sources } => {
            scope.autoscale(&parse_sources(sources)?).await?;
            Ok(())
        }
        ScopeAction::Run => Ok(scope.run().await?),
        ScopeAction::Stop => Ok(scope.stop().await?),
        ScopeAction::Single => Ok(scope.single().await?),
    }
}

/// Random set/readback cycles within the channel's frequency range.
async fn cmd_stress(synth: &Hs9000, channel: usize, count: u32) -> Result<()> {
    let ch = synth.channel(channel)?;
    let base = ch.frequency().get().await?;
    let lo = ch.freq_min().get().await?;
    let hi = ch.freq_max().get().await?;
    if hi <= lo {
        bail!("channel {channel} reports an empty frequency range");
    }
    println!("Stress test: {count} cycles on CH{channel}");
    println!("Base frequency: {}", format_si(base, "Hz"));

    let mut rng = rand::thread_rng();
    let mut success = 0u32;
    let mut failures = 0u32;
    let start = Instant::now();

    for i in 1..=count {
        // Whole kHz so readback compares exactly.
        let target = (rng.gen_range(lo..hi) / 1e3).round() * 1e3;

        if let Err(e) = ch.frequency().set(target).await {
            eprintln!("[{i}/{count}] set failed: {e}");
            failures += 1;
            continue;
        }

        match ch.frequency().get().await {
            Ok(readback) if (readback - target).abs() < 1.0 => success += 1,
            Ok(readback) => {
                eprintln!(
                    "[{i}/{count}] mismatch: set {} but read back {}",
                    format_si(target, "Hz"),
                    format_si(readback, "Hz")
                );
                failures += 1;
            }
            Err(e) => {
                eprintln!("[{i}/{count}] readback failed: {e}");
                failures += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    let rate = if elapsed.as_secs_f64() > 0.0 {
        count as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    println!();
    println!("Results:");
    println!("  Total cycles:   {count}");
    println!("  Successes:      {success}");
    println!("  Failures:       {failures}");
    println!("  Elapsed:        {:.3} s", elapsed.as_secs_f64());
    println!("  Rate:           {rate:.1} cycles/sec");

    if let Err(e) = ch.frequency().set(base).await {
        eprintln!("Warning: failed to restore base frequency: {e}");
    } else {
        println!("  Restored:       {}", format_si(base, "Hz"));
    }

    if failures > 0 {
        bail!("{failures} out of {count} stress test cycles failed");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Commands that need no connection.
    match &cli.command {
        Command::List => return cmd_list(&load_registry(&cli)?),
        Command::Info => return cmd_info(&load_registry(&cli)?, require_model(&cli)?),
        Command::Discover { wait_ms } => {
            return cmd_discover(Duration::from_millis(*wait_ms)).await;
        }
        _ => {}
    }

    let mut inst = open_instrument(&cli).await?;

    let result = match &cli.command {
        Command::Idn => match inst.scpi().identify().await {
            Ok(id) => {
                println!("Manufacturer: {}", id.manufacturer);
                println!("Model:        {}", id.model);
                println!("Serial:       {}", id.serial);
                println!("Firmware:     {}", id.firmware);
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        Command::Errors => match inst.scpi().check_error_queue().await {
            Ok(errors) if errors.is_empty() => {
                println!("No errors.");
                Ok(())
            }
            Ok(errors) => {
                for e in &errors {
                    println!("{e}");
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        Command::Query { command } => match inst.scpi().query(command).await {
            Ok(reply) => {
                println!("{reply}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        Command::Write { command } => match inst.scpi().write(command).await {
            Ok(Some(ack)) => {
                println!("{ack}");
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e.into()),
        },
        Command::Synth { channel, action } => match as_synth(&inst) {
            Ok(synth) => cmd_synth(synth, *channel, action).await,
            Err(e) => Err(e),
        },
        Command::Scope { action } => match as_scope(&mut inst) {
            Ok(scope) => cmd_scope(scope, action).await,
            Err(e) => Err(e),
        },
        Command::Stress { count, channel } => match as_synth(&inst) {
            Ok(synth) => cmd_stress(synth, *channel, *count).await,
            Err(e) => Err(e),
        },
        Command::List | Command::Info | Command::Discover { .. } => {
            unreachable!("handled before connecting")
        }
    };

    inst.close().await.ok();
    result
}
