//! Workflow validation and execution handlers.
//!
//! Workflows are submitted inline as `WorkflowDocument` JSON; nothing is
//! persisted between requests.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use pipeloom_core::workflow::graph::Graph;
use pipeloom_types::execution::{ValidationReport, WorkflowExecutionResult};
use pipeloom_types::workflow::WorkflowDocument;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for both execute endpoints.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub workflow: WorkflowDocument,
    /// Text handed to every `input` node.
    #[serde(default)]
    pub input: String,
}

/// POST /api/v1/workflows/validate - Structural validation without running.
///
/// Always 200; the report's `valid` flag carries the verdict. Node config
/// that does not match its type is reported as a validation error.
pub async fn validate_workflow(
    Json(doc): Json<WorkflowDocument>,
) -> Json<ApiResponse<ValidationReport>> {
    let start = Instant::now();

    let report = match Graph::from_document(&doc) {
        Ok(graph) => pipeloom_core::workflow::validator::validate(&graph),
        Err(e) => ValidationReport::new(vec![e.to_string()], Vec::new()),
    };

    Json(ApiResponse::success(report, start))
}

/// POST /api/v1/workflows/execute - Run to completion and return the result.
///
/// A failed node still yields 200 with `success: false`; only invalid
/// workflows and engine faults are HTTP errors.
pub async fn execute_workflow(
    State(state): State<AppState>,
    Json(body): Json<ExecuteRequest>,
) -> Result<Json<ApiResponse<WorkflowExecutionResult>>, AppError> {
    let start = Instant::now();

    let graph = Arc::new(Graph::from_document(&body.workflow)?);
    let handle = state.engine().execute_stream(graph, body.input)?;
    let run_id = handle.run_id();
    let _registration = state.register_run(run_id, handle.stop_handle());

    tracing::info!(%run_id, "workflow run started");
    let result = handle.finish().await?;
    tracing::info!(%run_id, success = result.success, was_stopped = result.was_stopped, "workflow run finished");

    let resp = ApiResponse::success(result, start)
        .with_link("stop", &format!("/api/v1/runs/{run_id}/stop"));
    Ok(Json(resp))
}

/// POST /api/v1/workflows/execute/stream - Run with SSE progress.
///
/// The first SSE event is `run` carrying the run id; every engine event
/// follows with its `type` as the SSE event name. Closing the connection
/// stops the run.
pub async fn execute_workflow_stream(
    State(state): State<AppState>,
    Json(body): Json<ExecuteRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let graph = Arc::new(Graph::from_document(&body.workflow)?);
    let handle = state.engine().execute_stream(graph, body.input)?;
    let run_id = handle.run_id();
    let registration = state.register_run(run_id, handle.stop_handle());
    let (mut events, _outcome) = handle.into_parts();

    tracing::info!(%run_id, "streaming workflow run started");

    let sse_stream = async_stream::stream! {
        let _registration = registration;

        let run_json = serde_json::json!({ "run_id": run_id });
        yield Ok::<_, Infallible>(Event::default().event("run").data(run_json.to_string()));

        while let Some(event) = events.next().await {
            match serde_json::to_string(&event) {
                Ok(data) => yield Ok(Event::default().event(event.event_type()).data(data)),
                Err(e) => {
                    tracing::warn!(%run_id, error = %e, "failed to serialize execution event");
                }
            }
        }

        tracing::debug!(%run_id, "event stream closed");
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
