//! Session store boundary.
//!
//! Every mutation is a patch function applied to the latest committed value
//! of a session. A store must apply a patch atomically: either the whole
//! mutated session is committed or nothing is. Two concurrent patches on the
//! same session therefore serialize at the store, and the later one sees the
//! earlier one's result (last-committed-wins).

use async_trait::async_trait;
use dashmap::DashMap;
use strand_core::{Session, SessionId};
use tracing::debug;

use crate::errors::{Result, StoreError};

/// A read-modify-write transform over a session.
///
/// Returns `true` if it changed the session; `false` commits nothing.
pub type SessionPatch = Box<dyn FnOnce(&mut Session) -> bool + Send>;

/// Result of [`SessionStore::update_session`].
#[derive(Clone, Debug, PartialEq)]
pub enum PatchResult {
    /// The patch changed the session; carries the committed value.
    Committed(Box<Session>),
    /// The patch reported no change; nothing was written.
    Unchanged,
}

impl PatchResult {
    /// Whether anything was written.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

/// Atomic read/patch access to persisted sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the latest committed value of a session.
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Apply `patch` to the latest committed value and commit the result.
    ///
    /// Committing bumps [`Session::revision`]. Fails with
    /// [`StoreError::SessionNotFound`] if the session does not exist.
    async fn update_session(&self, id: &SessionId, patch: SessionPatch) -> Result<PatchResult>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local [`SessionStore`] backed by a concurrent map.
///
/// A patch runs against a copy while the session's shard is write-locked, so
/// a patch that panics leaves the committed value untouched.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, Session>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a session.
    pub fn insert(&self, session: Session) {
        let _ = self.sessions.insert(session.id.clone(), session);
    }

    /// Remove a session, returning it if present.
    pub fn remove(&self, id: &SessionId) -> Option<Session> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(self.sessions.get(id).map(|s| s.value().clone()))
    }

    async fn update_session(&self, id: &SessionId, patch: SessionPatch) -> Result<PatchResult> {
        let mut slot = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::SessionNotFound(id.clone()))?;

        let mut draft = slot.value().clone();
        if !patch(&mut draft) {
            return Ok(PatchResult::Unchanged);
        }
        draft.touch();
        *slot = draft.clone();
        debug!(session_id = %id, revision = draft.revision, "session patch committed");
        Ok(PatchResult::Committed(Box::new(draft)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
