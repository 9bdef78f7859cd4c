//! Error types for the node registry.

use thiserror::Error;
use warden_types::Interrupted;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur in registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Caller-supplied table name is not a safe identifier.
    #[error("invalid table name {0:?}: must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidTableName(String),

    /// The backing store rejected or failed the operation.
    #[error("{op}: {message}")]
    Storage {
        /// Operation that failed (e.g. "register node").
        op: &'static str,
        /// Backend error text.
        message: String,
    },

    /// The call context was cancelled or expired mid-operation.
    #[error("{op}: {source}")]
    Interrupted {
        /// Operation that was cut short.
        op: &'static str,
        /// Why it stopped.
        #[source]
        source: Interrupted,
    },

    /// A stored row could not be decoded.
    #[error("invalid stored record: {0}")]
    InvalidData(String),
}

impl RegistryError {
    /// Returns the interruption cause if the context stopped this call.
    #[must_use]
    pub fn interrupted(&self) -> Option<Interrupted> {
        match self {
            Self::Interrupted { source, .. } => Some(*source),
            _ => None,
        }
    }

    pub(crate) fn storage(op: &'static str) -> impl FnOnce(String) -> Self {
        move |message| Self::Storage { op, message }
    }

    pub(crate) fn interrupted_during(op: &'static str) -> impl FnOnce(Interrupted) -> Self {
        move |source| Self::Interrupted { op, source }
    }
}
