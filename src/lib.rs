// src/lib.rs
// Public library surface for the service binary, the CLI and integration tests.

pub mod api;
pub mod classify;
pub mod config;
pub mod decision;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineConfig;
pub use crate::decision::{BiasVerdict, Direction};
pub use crate::dispatch::{AlertDispatcher, AlertState, DispatchOutcome};
pub use crate::notify::NotifierMux;
pub use crate::pipeline::{CycleOutcome, CycleSnapshot, SignalHub};

use shuttle_axum::axum::Router;

/// The full HTTP surface: API routes plus `/metrics` when a recorder is installed.
pub fn app(hub: SignalHub, metrics: Option<&crate::metrics::Metrics>) -> Router {
    let router = api::create_router(hub);
    match metrics {
        Some(m) => router.merge(m.router()),
        None => router,
    }
}
