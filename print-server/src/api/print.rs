//! Print submission
//!
//! The image is decoded before admission so a bad payload is a 400 for the
//! caller rather than a failed job later on.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};
use receipt_printer::{normalize, unwrap_payload};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::ServerState;
use crate::queue::{JobPayload, MAX_COPIES, MIN_COPIES};
use crate::utils::{AppError, AppResult};

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/print", post(submit))
        // Path used by older clients
        .route("/Print", post(submit))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PrintRequest {
    /// Base64, data URI, or (rarely) raw image text
    #[serde(alias = "jpeg")]
    #[validate(length(min = 1, message = "image must not be empty"))]
    pub image: String,
    #[serde(default)]
    pub printer: Option<String>,
    #[serde(default = "default_copies")]
    #[validate(range(
        min = MIN_COPIES,
        max = MAX_COPIES,
        message = "copies must be between 1 and 100"
    ))]
    pub copies: u32,
}

fn default_copies() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct PrintResponse {
    pub success: bool,
    pub job_id: String,
    pub message: String,
}

/// POST /print
async fn submit(
    State(state): State<ServerState>,
    body: Result<Json<PrintRequest>, JsonRejection>,
) -> AppResult<Json<PrintResponse>> {
    let Json(req) = body?;
    req.validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let text = req.image.into_bytes();
    let (bytes, width, height) = tokio::task::spawn_blocking(move || {
        let bytes = unwrap_payload(&text)?.into_owned();
        let image = normalize(&bytes)?;
        Ok::<_, receipt_printer::DecodeError>((bytes, image.width(), image.height()))
    })
    .await
    .map_err(|e| AppError::internal(e.to_string()))??;

    let printer = resolve_printer(&state, req.printer.as_deref()).await?;

    let job_id = state
        .store
        .add(JobPayload::from_bytes(bytes), &printer, req.copies)?;

    tracing::info!(
        job_id = %job_id,
        printer = %printer,
        copies = req.copies,
        width,
        height,
        "Print request accepted"
    );

    Ok(Json(PrintResponse {
        success: true,
        job_id,
        message: format!("Queued for {}", printer),
    }))
}

/// Request value, then the configured default, then the transport default
async fn resolve_printer(state: &ServerState, requested: Option<&str>) -> AppResult<String> {
    let requested = requested
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    let printer = match requested.or_else(|| state.config.default_printer.clone()) {
        Some(p) => p,
        None => state
            .transport
            .default_printer()
            .await
            .ok_or_else(|| AppError::validation("No printer specified and no default printer"))?,
    };

    if !state.transport.printer_exists(&printer).await {
        return Err(AppError::not_found(format!("Printer {} not found", printer)));
    }
    Ok(printer)
}
