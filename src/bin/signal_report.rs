//! Print the signal report for one symbol.
//!
//! Usage: signal_report <SYMBOL> [--json]

use anyhow::{bail, Context, Result};
use chrono::Utc;

use zonefx::bars::BarSource;
use zonefx::config::Config;
use zonefx::report::generate;
use zonefx::venue::BridgeVenue;

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(symbol) = args.next() else {
        bail!("usage: signal_report <SYMBOL> [--json]");
    };
    let as_json = args.any(|a| a == "--json");

    let cfg = Config::from_env()?;
    cfg.validate()?;
    let venue = BridgeVenue::new(&cfg.venue_url, cfg.venue_timeout()).context("venue bridge client")?;
    // the report only needs enough history for its SMA and the volume zones
    let source = BarSource::new(cfg.timeframe, cfg.window.min(200), cfg.session_offset_secs);

    let report = generate(
        &venue,
        &source,
        &symbol.to_uppercase(),
        Utc::now(),
        cfg.report_sma_period,
        cfg.venue_timeout(),
    )
    .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Time: {}", Utc::now().to_rfc3339());
        println!("{}", report);
    }
    Ok(())
}
