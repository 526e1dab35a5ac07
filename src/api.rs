use shuttle_axum::axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::decision::BiasVerdict;
use crate::pipeline::{CycleOutcome, CycleSnapshot, SignalHub};

pub fn create_router(hub: SignalHub) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/latest", get(latest))
        .route("/api/verdict", get(verdict))
        .route("/api/refresh", post(refresh))
        .layer(CorsLayer::very_permissive())
        .with_state(hub)
}

async fn latest(State(hub): State<SignalHub>) -> Json<CycleSnapshot> {
    Json(hub.latest().as_ref().clone())
}

async fn verdict(State(hub): State<SignalHub>) -> Json<BiasVerdict> {
    Json(hub.latest().verdict)
}

async fn refresh(State(hub): State<SignalHub>) -> Response {
    match hub.run_cycle().await {
        CycleOutcome::Committed(snap) => Json(snap.as_ref().clone()).into_response(),
        CycleOutcome::Superseded => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "status": "superseded" })),
        )
            .into_response(),
    }
}
