// src/error.rs
//! Control-surface error taxonomy. Per-listing and per-page failures never
//! surface here: workers absorb them into the task's error counts, and a
//! status poll shows degraded-but-live progress instead of an error.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Invalid task definition; rejected synchronously at Start.
    #[error("invalid task config: {0}")]
    Config(String),

    /// Unknown task identifier on Status/Stop.
    #[error("task {0} not found")]
    NotFound(String),

    /// Dedup ledger unavailable.
    #[error("dedup store error: {0}")]
    Store(#[from] sqlx::Error),
}

pub type MonitorResult<T> = Result<T, MonitorError>;

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = match &self {
            MonitorError::Config(_) => StatusCode::BAD_REQUEST,
            MonitorError::NotFound(_) => StatusCode::NOT_FOUND,
            MonitorError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            MonitorError::Config("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MonitorError::NotFound("id".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
