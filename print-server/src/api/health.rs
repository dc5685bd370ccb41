//! Health check, public (no API key)
//!
//! ```json
//! {
//!   "status": "ok",
//!   "service": "print-server",
//!   "version": "0.1.0",
//!   "queue": { "pending": 0, "processing": 0, "completed": 12, "failed": 1, "cancelled": 0 }
//! }
//! ```

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;
use crate::queue::QueueStats;

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    queue: QueueStats,
}

async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        queue: state.store.stats(),
    })
}
