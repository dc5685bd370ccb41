//! Job inspection and cancellation

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Serialize;

use crate::core::ServerState;
use crate::queue::JobView;
use crate::utils::AppResult;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/jobs", get(list))
        .route("/jobs/{id}", get(get_by_id).delete(cancel))
}

/// GET /jobs - all jobs in creation order
async fn list(State(state): State<ServerState>) -> Json<Vec<JobView>> {
    Json(state.store.list().iter().map(JobView::from).collect())
}

/// GET /jobs/{id}
async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<JobView>> {
    let job = state.store.get(&id)?;
    Ok(Json(job.view()))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// DELETE /jobs/{id} - false for unknown or finished jobs
async fn cancel(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<CancelResponse>> {
    let cancelled = state.store.cancel(&id)?;
    Ok(Json(CancelResponse { cancelled }))
}
