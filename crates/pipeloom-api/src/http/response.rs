//! Envelope response format for all JSON API responses.
//!
//! ```json
//! {
//!   "data": { ... },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 5 },
//!   "errors": [],
//!   "_links": { "self": "..." }
//! }
//! ```

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    pub meta: ApiMeta,

    /// Empty on success.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorDetail>,

    #[serde(rename = "_links", skip_serializing_if = "HashMap::is_empty")]
    pub links: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ApiMeta {
    pub request_id: String,
    /// RFC 3339.
    pub timestamp: String,
    pub response_time_ms: u64,
}

impl ApiMeta {
    pub fn new(started: Instant) -> Self {
        Self {
            request_id: Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            response_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, started: Instant) -> Self {
        Self {
            data: Some(data),
            meta: ApiMeta::new(started),
            errors: Vec::new(),
            links: HashMap::new(),
        }
    }

    pub fn with_link(mut self, rel: &str, href: &str) -> Self {
        self.links.insert(rel.to_string(), href.to_string());
        self
    }
}

impl ApiResponse<()> {
    pub fn error(code: &str, message: String, details: Option<serde_json::Value>) -> Self {
        Self {
            data: None,
            meta: ApiMeta::new(Instant::now()),
            errors: vec![ApiErrorDetail {
                code: code.to_string(),
                message,
                details,
            }],
            links: HashMap::new(),
        }
    }
}
