//! Active run management.

use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RunStatus {
    pub run_id: Uuid,
    pub stopping: bool,
}

/// GET /api/v1/runs - Runs currently in flight.
pub async fn list_runs(State(state): State<AppState>) -> Json<ApiResponse<Vec<RunStatus>>> {
    let start = Instant::now();

    let mut runs: Vec<RunStatus> = state
        .runs
        .iter()
        .map(|entry| RunStatus {
            run_id: *entry.key(),
            stopping: entry.value().is_stopped(),
        })
        .collect();
    runs.sort_by_key(|r| r.run_id);

    Json(ApiResponse::success(runs, start).with_link("self", "/api/v1/runs"))
}

/// POST /api/v1/runs/{run_id}/stop - Request a graceful stop.
///
/// Idempotent while the run is active; 404 once it has finished.
pub async fn stop_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<RunStatus>>, AppError> {
    let start = Instant::now();

    let handle = state
        .runs
        .get(&run_id)
        .map(|entry| entry.value().clone())
        .ok_or(AppError::RunNotFound(run_id))?;
    handle.stop();
    tracing::info!(%run_id, "stop requested via API");

    Ok(Json(ApiResponse::success(
        RunStatus {
            run_id,
            stopping: true,
        },
        start,
    )))
}
