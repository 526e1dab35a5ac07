//! Run a single pipeline cycle against the configured feeds and print the result.
//!
//! Alerts go out through whatever channels the environment configures, so
//! this doubles as a notifier smoke test. Pass `--json` for the full snapshot.

use std::sync::Arc;

use anyhow::Context;
use forex_news_bias::{CycleOutcome, NotifierMux, PipelineConfig, SignalHub};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let as_json = std::env::args().skip(1).any(|a| a == "--json");

    let cfg = PipelineConfig::load_default()?;
    let hub = SignalHub::from_config(&cfg, Arc::new(NotifierMux::from_env().with_channel_timeout(cfg.alert.channel_timeout())));

    let snap = match hub.run_cycle().await {
        CycleOutcome::Committed(snap) => snap,
        CycleOutcome::Superseded => {
            println!("cycle superseded");
            return Ok(());
        }
    };

    if as_json {
        let out = serde_json::to_string_pretty(snap.as_ref()).context("serializing snapshot")?;
        println!("{out}");
        return Ok(());
    }

    println!(
        "{} {}: {:?} (bull {} / bear {})",
        cfg.engine.instrument_aliases.join("/"),
        cfg.engine.target_currency,
        snap.verdict.direction,
        snap.verdict.bullish_power,
        snap.verdict.bearish_power
    );
    for w in &snap.weighted {
        println!(
            "  {:>8} w{} {:<8} {:>4} {}",
            format!("{:?}", w.signal),
            w.weight,
            w.item.label().as_str(),
            w.item.raw.currency.as_deref().unwrap_or("-"),
            w.item.raw.headline
        );
    }
    for s in snap.sources.iter().filter(|s| s.error.is_some()) {
        println!("  feed {} failed: {}", s.name, s.error.as_deref().unwrap_or_default());
    }
    println!("alert: {:?}", snap.alert);
    Ok(())
}
