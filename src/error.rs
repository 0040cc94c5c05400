//! Error types for discussion operations.

use thiserror::Error;

/// Result type alias for discussion operations.
pub type Result<T> = std::result::Result<T, ColloquyError>;

/// Main error type for discussion operations.
///
/// The first five variants form the caller-facing taxonomy: they are terminal
/// failures surfaced unchanged, never retried internally, and each message
/// names the offending ids or types so API consumers can render actionable
/// errors. `Storage` and `Serialization` are raised by store backends.
#[derive(Error, Debug)]
pub enum ColloquyError {
    /// A referenced discussion, message, host, or week is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A role or tutoring check failed; the message lists offending ids.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested operation does not apply to this discussion type.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request is well-formed but violates a consistency rule
    /// (imprint mismatch, unsupported lesson section, non-owner edit).
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// The discussion type has no defined behavior for the operation.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ColloquyError {
    /// Creates a new not-found error.
    pub fn not_found<T: ToString>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Creates a new forbidden error.
    pub fn forbidden<T: ToString>(msg: T) -> Self {
        Self::Forbidden(msg.to_string())
    }

    /// Creates a new bad-request error.
    pub fn bad_request<T: ToString>(msg: T) -> Self {
        Self::BadRequest(msg.to_string())
    }

    /// Creates a new unprocessable error.
    pub fn unprocessable<T: ToString>(msg: T) -> Self {
        Self::Unprocessable(msg.to_string())
    }

    /// Creates a new not-implemented error.
    pub fn not_implemented<T: ToString>(msg: T) -> Self {
        Self::NotImplemented(msg.to_string())
    }

    /// Creates a new storage error.
    pub fn storage<T: ToString>(msg: T) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Creates a new serialization error.
    pub fn serialization<T: ToString>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }
}
