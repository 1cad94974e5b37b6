//! Shared error types.
//!
//! Lookups that miss are usually no-ops in strand (fork and thread operations
//! return an unchanged outcome). [`StrandError`] is what callers raise when
//! they explicitly require existence.

use thiserror::Error;

use crate::ids::{MessageId, SessionId, ThreadId};
use crate::session::ForkInvariantError;

/// Errors shared across strand crates.
#[derive(Debug, Error)]
pub enum StrandError {
    /// Session does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Message does not exist in any timeline of the session.
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    /// Archived thread does not exist.
    #[error("Thread not found: {0}")]
    ThreadNotFound(ThreadId),

    /// A fork entry violates its invariants.
    #[error("Invalid fork entry: {0}")]
    InvalidFork(#[from] ForkInvariantError),

    /// Internal / unexpected error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StrandError {
    /// Error category string for log fields.
    pub fn category(&self) -> &str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::MessageNotFound(_) => "message_not_found",
            Self::ThreadNotFound(_) => "thread_not_found",
            Self::InvalidFork(_) => "invalid_fork",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result alias using [`StrandError`].
pub type Result<T> = std::result::Result<T, StrandError>;
