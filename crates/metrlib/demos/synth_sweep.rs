//! Holzworth HS9000 frequency sweep example.
//!
//! Connects to an HS9002B over the LAN, sets channel 1 to a fixed power,
//! steps it from 1 GHz to 2 GHz in 100 MHz increments, and turns the
//! output off at the end.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p metrlib --example synth_sweep -- 192.168.1.40
//! ```

use std::time::Duration;

use metrlib::format_si;
use metrlib::holzworth::Hs9000Builder;
use metrlib::holzworth::models::hs9002b;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.1.40".to_string());

    println!("Connecting to HS9002B at {host}...");
    let synth = Hs9000Builder::new(hs9002b())
        .host(&host)
        .read_after_write(true)
        .build()
        .await?;

    let id = synth.identify().await?;
    println!("Connected: {id}");

    let ch1 = synth.channel(1)?;
    let (lo, hi) = (ch1.freq_min().get().await?, ch1.freq_max().get().await?);
    println!(
        "Channel 1 range: {} to {}",
        format_si(lo, "Hz"),
        format_si(hi, "Hz")
    );

    ch1.power().set(-5.0).await?;
    ch1.output().set(true).await?;

    let mut freq = 1e9;
    while freq <= 2e9 {
        ch1.frequency().set(freq).await?;
        let actual = ch1.frequency().get().await?;
        println!("  {}", format_si(actual, "Hz"));
        tokio::time::sleep(Duration::from_millis(250)).await;
        freq += 100e6;
    }

    synth.all_outputs_off().await?;
    synth.close().await?;
    Ok(())
}
