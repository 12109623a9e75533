//! Errors raised while parsing kernel values

use thiserror::Error;

/// Rejected identifier, rounding tag or time expression
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid time expression: {0}")]
    InvalidTime(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn invalid_identifier(message: impl Into<String>) -> Self {
        CoreError::InvalidIdentifier(message.into())
    }

    pub fn invalid_time(message: impl Into<String>) -> Self {
        CoreError::InvalidTime(message.into())
    }
}
