//! Forex news bias service: boots the pipeline scheduler and the Axum API.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use forex_news_bias::{app, metrics::Metrics, scheduler, NotifierMux, PipelineConfig, SignalHub};

/// `LOG_FORMAT=json` switches to JSON lines; `RUST_LOG` overrides the default `info` filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    // Shuttle may have installed a subscriber already.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load_default().context("loading pipeline config")?;

    let metrics = match Metrics::init(cfg.scheduler.interval_secs) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(error = ?e, "metrics recorder unavailable; /metrics disabled");
            None
        }
    };

    let notifier = Arc::new(NotifierMux::from_env().with_channel_timeout(cfg.alert.channel_timeout()));
    let hub = SignalHub::from_config(&cfg, notifier);
    scheduler::spawn_scheduler(hub.clone(), cfg.scheduler.interval());

    let router = app(hub, metrics.as_ref());
    Ok(router.into())
}
