//! DSOX1204G single-shot capture example.
//!
//! Configures channel 1 and the edge trigger, captures one record, and
//! prints a few points of the scaled trace.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p metrlib --example scope_capture -- 192.168.1.50
//! ```

use std::time::Duration;

use metrlib::keysight::models::dsox1204g;
use metrlib::keysight::scope::{Coupling, TriggerSlope, TriggerSource};
use metrlib::keysight::{Dsox1204gBuilder, WaveformFormat, WaveformSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.1.50".to_string());

    println!("Connecting to DSOX1204G at {host}...");
    let mut scope = Dsox1204gBuilder::new(dsox1204g())
        .host(&host)
        .command_timeout(Duration::from_secs(10))
        .build()
        .await?;
    println!("Connected: {}", scope.identify().await?);

    let ch1 = scope.channel(1)?;
    ch1.coupling().set(Coupling::Dc).await?;
    ch1.scale().set_str("500mV").await?;
    ch1.display().set(true).await?;

    scope.timebase().scale().set_str("100us").await?;
    scope.trigger().source().set(TriggerSource::Channel1).await?;
    scope.trigger().slope().set(TriggerSlope::Positive).await?;
    scope.trigger().level().set(0.0).await?;

    scope.set_data_format(WaveformFormat::Word);
    let traces = scope.fetch_trace(&[WaveformSource::Channel1]).await?;

    for trace in &traces {
        println!("{}: {} points", trace.label, trace.values.len());
        let step = (trace.values.len() / 10).max(1);
        for (t, v) in trace.time.iter().zip(&trace.values).step_by(step) {
            println!("  {:>12.3e} s  {:>9.4} V", t, v);
        }
    }

    scope.run().await?;
    scope.close().await?;
    Ok(())
}
