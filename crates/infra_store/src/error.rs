//! Store error types

use thiserror::Error;

/// Errors raised while loading a store from external data
#[derive(Debug, Error)]
pub enum StoreError {
    /// The snapshot is not valid JSON for the expected shape
    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    /// The snapshot parsed but holds unusable entries
    #[error("Invalid snapshot: {0}")]
    Invalid(String),
}

impl StoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        StoreError::Invalid(message.into())
    }
}
