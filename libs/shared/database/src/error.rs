use thiserror::Error;

use shared_models::error::AppError;

/// Failures surfaced by every store seam, whatever the backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A conditional write found the row changed since it was read.
    #[error("Stale write rejected: {0}")]
    StaleWrite(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed record: {0}")]
    Malformed(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Malformed(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::StaleWrite(msg) => AppError::conflict(msg),
            StoreError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            StoreError::Malformed(msg) => AppError::Internal(msg),
        }
    }
}
