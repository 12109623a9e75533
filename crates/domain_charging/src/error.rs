//! Charging domain errors

use core_kernel::{CoreError, PortError};
use thiserror::Error;

/// Errors that can occur in the charging domain
#[derive(Debug, Error)]
pub enum ChargingError {
    /// Missing or malformed input; nothing was mutated
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    /// The account is disabled and cannot be charged
    #[error("Account disabled: {0}")]
    AccountDisabled(String),

    /// No action handler is registered for the tag
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    /// Not enough credit to start a session
    #[error("Insufficient credit for {0}")]
    InsufficientCredit(String),

    /// Exclusive access to the named resources could not be acquired in time
    #[error("Lock timeout after {timeout_ms}ms on {resources}")]
    LockTimeout {
        resources: String,
        timeout_ms: u64,
    },

    /// The rating collaborator failed to price a request
    #[error("Rating failed: {0}")]
    Rating(#[source] PortError),

    /// A persistence collaborator failed
    #[error(transparent)]
    Port(#[from] PortError),

    /// A kernel value could not be parsed or validated
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ChargingError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ChargingError::InvalidInput(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        ChargingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true for any flavour of missing entity, including port lookups
    pub fn is_not_found(&self) -> bool {
        match self {
            ChargingError::NotFound { .. } => true,
            ChargingError::Port(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Returns true if retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ChargingError::LockTimeout { .. } => true,
            ChargingError::Port(e) | ChargingError::Rating(e) => e.is_transient(),
            _ => false,
        }
    }
}
