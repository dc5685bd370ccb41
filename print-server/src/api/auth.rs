//! API key middleware

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};

use crate::core::ServerState;
use crate::utils::AppError;

/// Header carrying the key
pub const API_KEY_HEADER: &str = "x-api-key";
/// Query parameter fallback
pub const API_KEY_QUERY: &str = "api_key";

/// Require the configured API key, either as `X-API-Key` or `?api_key=`
///
/// A no-op when no key is configured.
pub async fn require_api_key(
    State(state): State<ServerState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.auth_enabled() || req.method() == Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let from_header = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());
    let from_query = req.uri().query().and_then(query_key);

    let matches = from_header
        .or(from_query)
        .map(|key| key == state.config.api_key);

    match matches {
        Some(true) => Ok(next.run(req).await),
        Some(false) => {
            tracing::warn!(uri = %req.uri().path(), "Rejected request with wrong API key");
            Err(AppError::Unauthorized)
        }
        None => {
            tracing::warn!(uri = %req.uri().path(), "Rejected request without API key");
            Err(AppError::Unauthorized)
        }
    }
}

fn query_key(query: &str) -> Option<&str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == API_KEY_QUERY)
        .map(|(_, v)| v)
}
