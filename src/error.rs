// error.rs
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Everything a mutation or query can fail with. Terminal variants are
/// returned to the caller unchanged and never retried; `Transient` is
/// retried internally for idempotent writes before it surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("option index {index} is out of range for {len} options")]
    OutOfRange { index: usize, len: usize },
    #[error("only the poll creator may remove it")]
    Unauthorized,
    #[error("no such poll")]
    NotFound,
    #[error("temporarily unavailable: {0}")]
    Transient(String),
}

impl SyncError {
    fn status(&self) -> StatusCode {
        match self {
            SyncError::InvalidInput(_) | SyncError::OutOfRange { .. } => StatusCode::BAD_REQUEST,
            SyncError::Unauthorized => StatusCode::FORBIDDEN,
            SyncError::NotFound => StatusCode::NOT_FOUND,
            SyncError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        SyncError::Transient(err.to_string())
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
