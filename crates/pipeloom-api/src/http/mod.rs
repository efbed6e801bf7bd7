//! HTTP/REST API layer for pipeloom.
//!
//! Axum-based API at `/api/v1/` with envelope responses, SSE run streaming
//! and CORS support.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
