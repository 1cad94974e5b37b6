//! Context and compaction error types.

use strand_core::{MessageId, SessionId};
use strand_session::StoreError;
use thiserror::Error;

use crate::compaction::CompactionStatus;

/// Errors reported by a [`SummaryGenerator`](crate::compaction::SummaryGenerator).
#[derive(Debug, Error)]
pub enum SummarizerError {
    /// The model call timed out.
    #[error("summarizer timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The model call failed.
    #[error("summarizer call failed: {message}")]
    CallFailed {
        /// Error message.
        message: String,
    },

    /// The summarizer produced no text.
    #[error("summarizer returned an empty summary")]
    Empty,
}

impl SummarizerError {
    /// Error category string for log fields.
    pub fn category(&self) -> &str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::CallFailed { .. } => "call_failed",
            Self::Empty => "empty",
        }
    }
}

/// Errors raised while running a compaction.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// Session store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Summarization failed.
    #[error("summarization failed: {0}")]
    Summarizer(#[from] SummarizerError),

    /// Session does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// The requested boundary is not in the live timeline.
    #[error("compaction boundary not found: {0}")]
    BoundaryNotFound(MessageId),

    /// The summarization task panicked.
    #[error("compaction panicked: {0}")]
    Panicked(String),

    /// A UI state change that the state machine does not allow.
    #[error("invalid compaction transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status.
        from: CompactionStatus,
        /// Requested status.
        to: CompactionStatus,
    },
}

impl CompactionError {
    /// Error category string for log fields.
    pub fn category(&self) -> &str {
        match self {
            Self::Store(e) => e.category(),
            Self::Summarizer(e) => e.category(),
            Self::SessionNotFound(_) => "session_not_found",
            Self::BoundaryNotFound(_) => "boundary_not_found",
            Self::Panicked(_) => "panicked",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

/// Result alias using [`CompactionError`].
pub type Result<T> = std::result::Result<T, CompactionError>;
