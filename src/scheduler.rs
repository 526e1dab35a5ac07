// src/scheduler.rs
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pipeline::{CycleOutcome, SignalHub};

/// Run a cycle now and then every `interval`. A slow cycle skips the ticks
/// it overran instead of queueing them.
pub fn spawn_scheduler(hub: SignalHub, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(target: "pipeline", interval_secs = interval.as_secs(), "scheduler started");
        loop {
            ticker.tick().await;
            match hub.run_cycle().await {
                CycleOutcome::Committed(snap) => {
                    tracing::debug!(target: "pipeline", seq = snap.seq, "scheduled cycle done")
                }
                CycleOutcome::Superseded => {
                    tracing::debug!(target: "pipeline", "scheduled cycle superseded")
                }
            }
        }
    })
}
