//! Engine error taxonomy
//!
//! Every error carries a stable kind (for the RPC surface) plus a human
//! message. Store-level rusqlite errors fold in via `From`; UNIQUE
//! constraint collisions are translated to `Duplicate` at the store
//! boundary so callers never see raw SQLite codes.

use thiserror::Error;

// ============================================================================
// ERROR TYPE
// ============================================================================

/// Errors surfaced by the memory engine
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// Request rejected at the API boundary; no state change
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced id absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Hash or unique-constraint collision
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// Lifecycle or consolidation-state rule violation (caller bug)
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// External dependency down or saturated; retryable
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Request or job deadline passed; partial results may exist
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Invariant violated; logged with context, generic to users
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error (maps to Unavailable on connection loss)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

// ============================================================================
// STABLE KINDS
// ============================================================================

/// Stable error codes exposed over the tool surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Duplicate,
    InvalidTransition,
    Unavailable,
    DeadlineExceeded,
    Internal,
}

impl ErrorKind {
    /// Wire representation of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Duplicate => "DUPLICATE",
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl EngineError {
    /// Stable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Duplicate(_) => ErrorKind::Duplicate,
            EngineError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            EngineError::Unavailable(_) => ErrorKind::Unavailable,
            EngineError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            EngineError::Internal(_) => ErrorKind::Internal,
            // Connection-level failures are retryable; everything else is a bug
            EngineError::Database(rusqlite::Error::SqliteFailure(e, _))
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                ErrorKind::Unavailable
            }
            EngineError::Database(_) => ErrorKind::Internal,
            EngineError::Io(_) => ErrorKind::Unavailable,
        }
    }

    /// True when the failure is transient and a retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unavailable | ErrorKind::DeadlineExceeded)
    }
}

/// Translate a rusqlite error into the engine taxonomy, mapping UNIQUE
/// constraint violations to `Duplicate`.
pub(crate) fn map_constraint(err: rusqlite::Error, what: &str) -> EngineError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            EngineError::Duplicate(what.to_string())
        }
        _ => EngineError::Database(err),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            EngineError::NotFound("x".into()).kind().as_str(),
            "NOT_FOUND"
        );
        assert_eq!(
            EngineError::Duplicate("x".into()).kind().as_str(),
            "DUPLICATE"
        );
        assert_eq!(
            EngineError::InvalidTransition("x".into()).kind().as_str(),
            "INVALID_TRANSITION"
        );
    }

    #[test]
    fn unavailable_is_retryable() {
        assert!(EngineError::Unavailable("db".into()).is_retryable());
        assert!(!EngineError::NotFound("id".into()).is_retryable());
    }
}
