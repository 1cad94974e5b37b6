//! Store error types.

use strand_core::SessionId;
use thiserror::Error;

/// Errors reported by a [`SessionStore`](crate::store::SessionStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Session does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Backend failure (I/O, serialization, connection).
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Error category string for log fields.
    pub fn category(&self) -> &str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::Backend(_) => "backend",
        }
    }
}

impl From<StoreError> for strand_core::StrandError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound(id) => Self::SessionNotFound(id),
            StoreError::Backend(msg) => Self::Internal(msg),
        }
    }
}

/// Result alias using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use strand_core::StrandError;

    #[test]
    fn not_found_maps_to_core_error() {
        let err: StrandError = StoreError::SessionNotFound(SessionId::from("s1")).into();
        assert_matches!(err, StrandError::SessionNotFound(id) if id.as_str() == "s1");
    }

    #[test]
    fn category_strings() {
        assert_eq!(
            StoreError::SessionNotFound(SessionId::from("x")).category(),
            "session_not_found"
        );
        assert_eq!(StoreError::Backend("disk".into()).category(), "backend");
    }
}
