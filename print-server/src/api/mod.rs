//! HTTP API
//!
//! | Path | Method | Auth |
//! |------|--------|------|
//! | /health | GET | no |
//! | /print | POST | API key |
//! | /jobs | GET | API key |
//! | /jobs/{id} | GET, DELETE | API key |
//! | /printers | GET | API key |

pub mod auth;
pub mod health;
pub mod jobs;
pub mod print;
pub mod printers;

use axum::{Router, extract::DefaultBodyLimit, middleware};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

/// Upper bound on request bodies (base64 images are large)
pub const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Assemble every route with its middleware; apply state with `.with_state`
pub fn build_app(state: &ServerState) -> Router<ServerState> {
    let protected = Router::new()
        .merge(print::router())
        .merge(jobs::router())
        .merge(printers::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .merge(health::router())
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
