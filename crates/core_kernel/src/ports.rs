//! Collaborator ports
//!
//! The charging engine talks to three collaborators it does not own: the
//! accounting storage, the rating engine and the lock service. Their traits
//! live in `domain_charging`; this module only holds what they share.
//!
//! ```text
//!                 Responder
//!                     │
//!     ┌───────────────┼────────────────┐
//!     ▼               ▼                ▼
//! AccountingStorage  RatingPort      Guardian
//!     │               │                │
//!  in-memory /     flat rater /    named locks
//!  remote store    remote rater
//! ```
//!
//! Calls are synchronous from the engine's point of view. An adapter may
//! cache or retry internally, but it answers each call with a value or a
//! [`PortError`].

use std::fmt;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by a collaborator
#[derive(Debug, Error)]
pub enum PortError {
    /// No account, shared group, destination or action set under that id
    #[error("Not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// The collaborator refused the data it was given
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// The backing system could not be reached
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Timeout after {waited_ms}ms: {operation}")]
    Timeout { operation: String, waited_ms: u64 },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl PortError {
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// A validation failure naming the offending persisted field
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn connection(message: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn timeout(operation: impl Into<String>, waited_ms: u64) -> Self {
        PortError::Timeout {
            operation: operation.into(),
            waited_ms,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Connection failures and timeouts may clear up on their own; a request
    /// that failed on them can be retried unchanged
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Connection { .. } | PortError::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PortError::Timeout { .. })
    }
}

/// Marker for collaborator traits
///
/// Adapters are shared by the threads serving concurrent requests.
pub trait DomainPort: Send + Sync + 'static {}
