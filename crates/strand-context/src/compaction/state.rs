//! Per-session compaction state machine.
//!
//! ```text
//!   idle ──start──▶ running ──ok──▶ idle
//!                    │  ▲
//!                 error  retry
//!                    ▼  │
//!                   failed
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{CompactionError, Result};

/// UI-observable compaction status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CompactionStatus {
    /// Nothing running.
    #[default]
    Idle,
    /// Summarization in progress.
    Running,
    /// The last attempt failed.
    Failed {
        /// Failure message.
        error: String,
    },
}

impl CompactionStatus {
    /// Whether moving to `next` is allowed.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::Failed { .. }, Self::Running)
                | (Self::Running, Self::Idle | Self::Failed { .. })
        )
    }

    /// Move to `next`, rejecting transitions the machine does not allow.
    pub fn transition(&mut self, next: Self) -> Result<()> {
        if !self.can_transition_to(&next) {
            return Err(CompactionError::InvalidTransition {
                from: self.clone(),
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    /// Whether a compaction is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Snapshot published to the UI sink.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionUiState {
    /// Current status.
    #[serde(flatten)]
    pub status: CompactionStatus,
    /// Partial summary text streamed so far.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub streaming_text: String,
}

impl CompactionUiState {
    /// Failure message, if the status is failed.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            CompactionStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn failed() -> CompactionStatus {
        CompactionStatus::Failed {
            error: "boom".into(),
        }
    }

    #[test]
    fn allowed_transitions() {
        let idle = CompactionStatus::Idle;
        let running = CompactionStatus::Running;
        assert!(idle.can_transition_to(&running));
        assert!(running.can_transition_to(&idle));
        assert!(running.can_transition_to(&failed()));
        assert!(failed().can_transition_to(&running));
    }

    #[test]
    fn rejected_transitions() {
        let idle = CompactionStatus::Idle;
        assert!(!idle.can_transition_to(&idle));
        assert!(!idle.can_transition_to(&failed()));
        assert!(!failed().can_transition_to(&CompactionStatus::Idle));
        assert!(!CompactionStatus::Running.can_transition_to(&CompactionStatus::Running));
    }

    #[test]
    fn transition_updates_or_errors() {
        let mut status = CompactionStatus::Idle;
        status.transition(CompactionStatus::Running).unwrap();
        assert!(status.is_running());
        assert_matches!(
            status.transition(CompactionStatus::Running),
            Err(CompactionError::InvalidTransition { .. })
        );
        status.transition(failed()).unwrap();
        assert_eq!(status, failed());
    }

    #[test]
    fn ui_state_serializes_flat() {
        let state = CompactionUiState {
            status: failed(),
            streaming_text: String::new(),
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "boom");
        assert!(value.get("streamingText").is_none());
        assert_eq!(state.error(), Some("boom"));
    }
}
