//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use pipeloom_core::workflow::definition::WorkflowError;
use pipeloom_core::workflow::engine::EngineError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// The submitted workflow could not be turned into a graph.
    Workflow(WorkflowError),
    Engine(EngineError),
    RunNotFound(Uuid),
    Internal(String),
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        AppError::Workflow(e)
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Engine(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, Option<serde_json::Value>) {
        match self {
            AppError::Workflow(_) => (StatusCode::BAD_REQUEST, "INVALID_WORKFLOW", None),
            AppError::Engine(EngineError::Validation(report)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                serde_json::to_value(report).ok(),
            ),
            AppError::Engine(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ENGINE_ERROR", None),
            AppError::RunNotFound(_) => (StatusCode::NOT_FOUND, "RUN_NOT_FOUND", None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Workflow(e) => e.to_string(),
            AppError::Engine(e) => e.to_string(),
            AppError::RunNotFound(id) => format!("no active run with id {id}"),
            AppError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, details) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %self.message(), "request failed");
        }
        (status, Json(ApiResponse::error(code, self.message(), details))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeloom_types::execution::ValidationReport;

    #[test]
    fn validation_maps_to_422_with_report() {
        let err = AppError::from(EngineError::Validation(ValidationReport::new(
            vec!["no input node".to_string()],
            vec![],
        )));
        let (status, code, details) = err.parts();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(code, "VALIDATION_ERROR");
        assert_eq!(details.unwrap()["errors"][0], "no input node");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            AppError::RunNotFound(Uuid::nil()).parts().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Engine(EngineError::StreamClosed).parts().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Workflow(WorkflowError::UnsupportedFormat("xml".to_string()))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
    }
}
