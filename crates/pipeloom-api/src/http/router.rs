//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`. Middleware: CORS, tracing.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Workflows
        .route("/workflows/validate", post(handlers::workflow::validate_workflow))
        .route("/workflows/execute", post(handlers::workflow::execute_workflow))
        .route(
            "/workflows/execute/stream",
            post(handlers::workflow::execute_workflow_stream),
        )
        // Runs
        .route("/runs", get(handlers::run::list_runs))
        .route("/runs/{run_id}/stop", post(handlers::run::stop_run));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
