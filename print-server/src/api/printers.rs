//! Printer discovery

use axum::{Json, Router, extract::State, routing::get};
use receipt_printer::PrinterInfo;

use crate::core::ServerState;
use crate::utils::{AppError, AppResult};

pub fn router() -> Router<ServerState> {
    Router::new().route("/printers", get(list))
}

/// GET /printers
async fn list(State(state): State<ServerState>) -> AppResult<Json<Vec<PrinterInfo>>> {
    let printers = state
        .transport
        .list_printers()
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(printers))
}
