//! Fork engine: fork transforms applied as atomic store patches.
//!
//! Each operation locates the anchor inside the patch (so it always runs
//! against the latest committed session), searching the live timeline first
//! and then archived threads in order. Exactly one timeline is touched per
//! call. A missing session, anchor, or fork entry yields
//! [`ForkOutcome::Unchanged`].

use std::sync::Arc;

use strand_core::{MessageId, Session, SessionId, Timeline, TimelineRef};
use tracing::{debug, instrument};

use crate::errors::{Result, StoreError};
use crate::forks::{self, ForkDirection, ForkInfo};
use crate::store::{PatchResult, SessionStore};

/// Result of a fork or thread operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkOutcome {
    /// The session was changed and committed.
    Applied,
    /// Nothing matched; the session is untouched.
    Unchanged,
}

/// Async fork operations over a [`SessionStore`].
pub struct ForkEngine {
    store: Arc<dyn SessionStore>,
}

impl ForkEngine {
    /// Create an engine over `store`.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Move the anchor's continuation out of line and open an empty branch.
    #[instrument(skip(self), fields(session_id = %session_id, anchor = %anchor))]
    pub async fn create_new_fork(
        &self,
        session_id: &SessionId,
        anchor: &MessageId,
    ) -> Result<ForkOutcome> {
        self.apply(session_id, anchor, Lookup::Message, forks::create_new_fork)
            .await
    }

    /// Switch the anchor's live branch one step, circularly.
    #[instrument(skip(self), fields(session_id = %session_id, anchor = %anchor))]
    pub async fn switch_fork(
        &self,
        session_id: &SessionId,
        anchor: &MessageId,
        direction: ForkDirection,
    ) -> Result<ForkOutcome> {
        self.apply(session_id, anchor, Lookup::Entry, move |t, a| {
            forks::switch_fork(t, a, direction)
        })
        .await
    }

    /// Switch the anchor's live branch to an explicit index.
    #[instrument(skip(self), fields(session_id = %session_id, anchor = %anchor))]
    pub async fn switch_fork_to_position(
        &self,
        session_id: &SessionId,
        anchor: &MessageId,
        target: usize,
    ) -> Result<ForkOutcome> {
        self.apply(session_id, anchor, Lookup::Entry, move |t, a| {
            forks::switch_fork_to_position(t, a, target)
        })
        .await
    }

    /// Delete the anchor's live branch.
    #[instrument(skip(self), fields(session_id = %session_id, anchor = %anchor))]
    pub async fn delete_fork(
        &self,
        session_id: &SessionId,
        anchor: &MessageId,
    ) -> Result<ForkOutcome> {
        self.apply(session_id, anchor, Lookup::Entry, forks::delete_fork)
            .await
    }

    /// Flatten every branch of the anchor into the timeline.
    #[deprecated(note = "lossy merge kept for old sessions; prefer switch_fork")]
    #[instrument(skip(self), fields(session_id = %session_id, anchor = %anchor))]
    pub async fn expand_fork(
        &self,
        session_id: &SessionId,
        anchor: &MessageId,
    ) -> Result<ForkOutcome> {
        self.apply(session_id, anchor, Lookup::Entry, forks::expand_fork)
            .await
    }

    /// Branch position and count at `anchor`, if it has a fork entry.
    pub async fn fork_info(
        &self,
        session_id: &SessionId,
        anchor: &MessageId,
    ) -> Result<Option<ForkInfo>> {
        let Some(session) = self.store.get_session(session_id).await? else {
            return Ok(None);
        };
        Ok(locate(&session, anchor, Lookup::Entry)
            .and_then(|at| session.timeline(at))
            .and_then(|t| forks::fork_info(t, anchor)))
    }

    async fn apply<F>(
        &self,
        session_id: &SessionId,
        anchor: &MessageId,
        lookup: Lookup,
        op: F,
    ) -> Result<ForkOutcome>
    where
        F: FnOnce(&mut Timeline, &MessageId) -> bool + Send + 'static,
    {
        let anchor = anchor.clone();
        let patch = Box::new(move |session: &mut Session| {
            let Some(at) = locate(session, &anchor, lookup) else {
                return false;
            };
            session.timeline_mut(at).is_some_and(|t| op(t, &anchor))
        });

        match self.store.update_session(session_id, patch).await {
            Ok(PatchResult::Committed(_)) => {
                debug!("fork operation committed");
                Ok(ForkOutcome::Applied)
            }
            Ok(PatchResult::Unchanged) => {
                debug!("fork operation matched nothing");
                Ok(ForkOutcome::Unchanged)
            }
            Err(StoreError::SessionNotFound(_)) => {
                debug!("session not found, fork operation skipped");
                Ok(ForkOutcome::Unchanged)
            }
            Err(e) => Err(e),
        }
    }
}

/// What makes a timeline a match for an anchor.
#[derive(Clone, Copy, Debug)]
enum Lookup {
    /// The timeline contains the anchor message.
    Message,
    /// The timeline contains the anchor and has a fork entry for it.
    Entry,
}

fn locate(session: &Session, anchor: &MessageId, lookup: Lookup) -> Option<TimelineRef> {
    let matches = |t: &Timeline| match lookup {
        Lookup::Message => t.contains(anchor),
        Lookup::Entry => t.forks.contains_key(anchor) && t.contains(anchor),
    };
    if matches(&session.timeline) {
        return Some(TimelineRef::Live);
    }
    session
        .threads
        .iter()
        .position(|thread| matches(&thread.timeline))
        .map(TimelineRef::Thread)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
