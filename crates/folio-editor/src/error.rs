//! Error types for folio-editor
//!
//! This module provides the error taxonomy of the editing session:
//! rejected payloads, unknown identities, calls made without an open page,
//! overlapping saves, and failures reported by the persistence gateway.

use thiserror::Error;
use uuid::Uuid;

use crate::element::ElementId;

/// Editor error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Malformed payload, rejected before it reaches the change buffer
    #[error("validation failed: {0}")]
    Validation(String),

    /// Identity absent from both the directory and the change buffer
    #[error("element not found: {0}")]
    NotFound(ElementId),

    /// Page unknown to the persistence gateway
    #[error("page not found: {0}")]
    PageNotFound(Uuid),

    /// Mutating call issued before a page finished loading
    #[error("no active page")]
    NoActivePage,

    /// A flush is already outstanding for this page
    #[error("save already in progress")]
    SaveInProgress,

    /// Network or remote failure while talking to the gateway
    #[error("sync failed during {operation}: {message}")]
    Sync {
        /// Gateway operation that failed
        operation: &'static str,
        /// Failure description
        message: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a sync error for a gateway operation
    #[must_use]
    pub fn sync(operation: &'static str, msg: impl Into<String>) -> Self {
        Self::Sync {
            operation,
            message: msg.into(),
        }
    }

    /// Check if the caller can retry the same call unchanged
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Sync { .. } | Self::SaveInProgress)
    }

    /// Check if the error stems from a programming mistake rather than the remote store
    #[must_use]
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::NoActivePage)
    }

    /// Get error code for host-facing reporting
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "element_not_found",
            Self::PageNotFound(_) => "page_not_found",
            Self::NoActivePage => "no_active_page",
            Self::SaveInProgress => "save_in_progress",
            Self::Sync { .. } => "sync_error",
            Self::Serialization(_) => "serialization_error",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for editor operations
pub type Result<T> = std::result::Result<T, Error>;
