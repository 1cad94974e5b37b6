//! Thread archive: moving the live timeline into archived snapshots and back.
//!
//! A thread owns its timeline together with that timeline's fork map and
//! compaction points; archiving and restoring move all three as a unit.
//! Operations that discard the live timeline first cancel its in-flight
//! generations through the [`GenerationRegistry`].

use std::sync::Arc;

use chrono::Utc;
use strand_core::{Message, MessageId, Session, SessionId, SessionThread, ThreadId, Timeline};
use tracing::{debug, info, instrument};

use crate::engine::ForkOutcome;
use crate::errors::{Result, StoreError};
use crate::generation::GenerationRegistry;
use crate::store::{PatchResult, SessionPatch, SessionStore};

/// Result of a thread operation.
pub type ThreadOutcome = ForkOutcome;

/// Archive and restore operations over a [`SessionStore`].
pub struct ThreadArchive {
    store: Arc<dyn SessionStore>,
    generations: Arc<GenerationRegistry>,
}

impl ThreadArchive {
    /// Create an archive over `store`, cancelling through `generations`.
    pub fn new(store: Arc<dyn SessionStore>, generations: Arc<GenerationRegistry>) -> Self {
        Self { store, generations }
    }

    /// Archive the live timeline and start a fresh one holding only a copy of
    /// the system prompt. `new_name` names the new live thread.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn archive_current_timeline(
        &self,
        session_id: &SessionId,
        new_name: Option<String>,
    ) -> Result<ThreadOutcome> {
        let generations = Arc::clone(&self.generations);
        self.commit(
            session_id,
            Box::new(move |session: &mut Session| {
                let _ = generations.cancel_all(&session.timeline.messages);
                let fresh = Timeline::from_messages(system_copy(&session.timeline));
                archive_live(session, fresh, new_name);
                true
            }),
        )
        .await
    }

    /// Archive the live timeline and start a new one of the system prompt
    /// copy followed by `seed`.
    #[instrument(skip(self, seed), fields(session_id = %session_id, seed = seed.len()))]
    pub async fn archive_with_seed(
        &self,
        session_id: &SessionId,
        seed: Vec<Message>,
        new_name: Option<String>,
    ) -> Result<ThreadOutcome> {
        let generations = Arc::clone(&self.generations);
        self.commit(
            session_id,
            Box::new(move |session: &mut Session| {
                let _ = generations.cancel_all(&session.timeline.messages);
                let mut messages = system_copy(&session.timeline);
                messages.extend(seed);
                archive_live(session, Timeline::from_messages(messages), new_name);
                true
            }),
        )
        .await
    }

    /// Archive the whole live timeline and continue from `boundary`.
    ///
    /// The new live timeline holds every message up to and including
    /// `boundary`, each copied under a fresh ID. No-op if `boundary` is not
    /// in the live timeline.
    #[instrument(skip(self), fields(session_id = %session_id, boundary = %boundary))]
    pub async fn thread_from_here(
        &self,
        session_id: &SessionId,
        boundary: &MessageId,
        new_name: Option<String>,
    ) -> Result<ThreadOutcome> {
        let generations = Arc::clone(&self.generations);
        let boundary = boundary.clone();
        self.commit(
            session_id,
            Box::new(move |session: &mut Session| {
                let Some(idx) = session.timeline.index_of(&boundary) else {
                    return false;
                };
                let kept: Vec<Message> = session.timeline.messages[..=idx]
                    .iter()
                    .filter(|m| !m.generating)
                    .map(Message::with_fresh_id)
                    .collect();
                let _ = generations.cancel_all(&session.timeline.messages);
                archive_live(session, Timeline::from_messages(kept), new_name);
                true
            }),
        )
        .await
    }

    /// Make `thread_id` the live timeline; the previous live timeline is
    /// archived as a new thread at the end of the list.
    #[instrument(skip(self), fields(session_id = %session_id, thread_id = %thread_id))]
    pub async fn switch_thread(
        &self,
        session_id: &SessionId,
        thread_id: &ThreadId,
    ) -> Result<ThreadOutcome> {
        let generations = Arc::clone(&self.generations);
        let thread_id = thread_id.clone();
        self.commit(
            session_id,
            Box::new(move |session: &mut Session| {
                let Some(idx) = session.threads.iter().position(|t| t.id == thread_id) else {
                    return false;
                };
                let _ = generations.cancel_all(&session.timeline.messages);
                let target = session.threads.remove(idx);
                archive_live(session, target.timeline, Some(target.name));
                true
            }),
        )
        .await
    }

    /// Delete an archived thread.
    #[instrument(skip(self), fields(session_id = %session_id, thread_id = %thread_id))]
    pub async fn remove_thread(
        &self,
        session_id: &SessionId,
        thread_id: &ThreadId,
    ) -> Result<ThreadOutcome> {
        let thread_id = thread_id.clone();
        self.commit(
            session_id,
            Box::new(move |session: &mut Session| {
                let before = session.threads.len();
                session.threads.retain(|t| t.id != thread_id);
                session.threads.len() != before
            }),
        )
        .await
    }

    /// Discard the live timeline.
    ///
    /// The most recently archived thread becomes live; with no archived
    /// threads the live timeline is reset to its system prompt.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn remove_current_thread(&self, session_id: &SessionId) -> Result<ThreadOutcome> {
        let generations = Arc::clone(&self.generations);
        self.commit(
            session_id,
            Box::new(move |session: &mut Session| {
                let _ = generations.cancel_all(&session.timeline.messages);
                match session.threads.pop() {
                    Some(thread) => {
                        session.timeline = thread.timeline;
                        session.thread_name = Some(thread.name);
                    }
                    None => {
                        session.timeline = Timeline::from_messages(system_copy(&session.timeline));
                        session.thread_name = None;
                    }
                }
                true
            }),
        )
        .await
    }

    /// Rename an archived thread.
    #[instrument(skip(self), fields(session_id = %session_id, thread_id = %thread_id))]
    pub async fn rename_thread(
        &self,
        session_id: &SessionId,
        thread_id: &ThreadId,
        name: String,
    ) -> Result<ThreadOutcome> {
        let thread_id = thread_id.clone();
        self.commit(
            session_id,
            Box::new(move |session: &mut Session| {
                match session.threads.iter_mut().find(|t| t.id == thread_id) {
                    Some(thread) if thread.name != name => {
                        thread.name = name;
                        true
                    }
                    _ => false,
                }
            }),
        )
        .await
    }

    /// Rename the live thread.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn rename_current_thread(
        &self,
        session_id: &SessionId,
        name: String,
    ) -> Result<ThreadOutcome> {
        self.commit(
            session_id,
            Box::new(move |session: &mut Session| {
                if session.thread_name.as_deref() == Some(name.as_str()) {
                    return false;
                }
                session.thread_name = Some(name);
                true
            }),
        )
        .await
    }

    async fn commit(&self, session_id: &SessionId, patch: SessionPatch) -> Result<ThreadOutcome> {
        match self.store.update_session(session_id, patch).await {
            Ok(PatchResult::Committed(session)) => {
                info!(
                    threads = session.threads.len(),
                    live_messages = session.messages().len(),
                    "thread operation committed"
                );
                Ok(ThreadOutcome::Applied)
            }
            Ok(PatchResult::Unchanged) => {
                debug!("thread operation matched nothing");
                Ok(ThreadOutcome::Unchanged)
            }
            Err(StoreError::SessionNotFound(_)) => {
                debug!("session not found, thread operation skipped");
                Ok(ThreadOutcome::Unchanged)
            }
            Err(e) => Err(e),
        }
    }
}

/// Copy of the leading system prompt under a fresh ID, if there is one.
pub(crate) fn system_copy(timeline: &Timeline) -> Vec<Message> {
    timeline
        .system_message()
        .map(Message::with_fresh_id)
        .into_iter()
        .collect()
}

/// Push the live timeline (with its forks and compaction points) onto the
/// thread list and install `next` as the live timeline.
pub(crate) fn archive_live(session: &mut Session, next: Timeline, next_name: Option<String>) {
    let archived_name = session
        .thread_name
        .take()
        .unwrap_or_else(|| format!("Thread {}", session.threads.len() + 1));
    let previous = std::mem::replace(&mut session.timeline, next);
    session.threads.push(SessionThread {
        id: ThreadId::new(),
        name: archived_name,
        timeline: previous,
        created_at: Utc::now(),
    });
    session.thread_name = next_name;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;
    use strand_core::CompactionPoint;

    fn msg(id: &str) -> Message {
        Message::user(id).with_id(id)
    }

    fn sys() -> Message {
        Message::system("be helpful").with_id("sys")
    }

    struct Fixture {
        store: Arc<MemorySessionStore>,
        generations: Arc<GenerationRegistry>,
        archive: ThreadArchive,
        id: SessionId,
    }

    fn fixture(session: Session) -> Fixture {
        let id = session.id.clone();
        let store = Arc::new(MemorySessionStore::new());
        store.insert(session);
        let generations = Arc::new(GenerationRegistry::new());
        let archive = ThreadArchive::new(store.clone(), generations.clone());
        Fixture {
            store,
            generations,
            archive,
            id,
        }
    }

    async fn load(f: &Fixture) -> Session {
        f.store.get_session(&f.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn archive_moves_forks_and_points_with_timeline() {
        let mut session = Session::with_messages("s", vec![sys(), msg("u1"), msg("a1")]);
        session.timeline.compaction_points.push(CompactionPoint {
            boundary_message_id: MessageId::from("u1"),
            summary_message_id: MessageId::from("sum"),
            created_at: Utc::now(),
        });
        let f = fixture(session);

        let outcome = f
            .archive
            .archive_current_timeline(&f.id, Some("fresh".into()))
            .await
            .unwrap();
        assert_eq!(outcome, ThreadOutcome::Applied);

        let session = load(&f).await;
        assert_eq!(session.messages().len(), 1);
        assert!(session.messages()[0].is_system());
        assert_ne!(session.messages()[0].id.as_str(), "sys");
        assert!(session.timeline.compaction_points.is_empty());
        assert_eq!(session.thread_name.as_deref(), Some("fresh"));

        assert_eq!(session.threads.len(), 1);
        let thread = &session.threads[0];
        assert_eq!(thread.name, "Thread 1");
        assert_eq!(thread.timeline.messages.len(), 3);
        assert_eq!(thread.timeline.compaction_points.len(), 1);
    }

    #[tokio::test]
    async fn archive_cancels_in_flight_generation() {
        let streaming = Message::assistant("").with_id("gen").generating();
        let f = fixture(Session::with_messages("s", vec![sys(), streaming.clone()]));
        let token = f.generations.register(&streaming.id);

        let _ = f.archive.archive_current_timeline(&f.id, None).await.unwrap();

        assert!(token.is_cancelled());
        assert!(!f.generations.finish(&streaming.id));
    }

    #[tokio::test]
    async fn archive_with_seed_starts_from_system_and_seed() {
        let f = fixture(Session::with_messages("s", vec![sys(), msg("u1")]));
        let seed = Message::user("summary").with_id("sum");
        let _ = f
            .archive
            .archive_with_seed(&f.id, vec![seed], None)
            .await
            .unwrap();

        let session = load(&f).await;
        assert_eq!(session.messages().len(), 2);
        assert!(session.messages()[0].is_system());
        assert_eq!(session.messages()[1].id.as_str(), "sum");
        assert_eq!(session.threads[0].timeline.messages.len(), 2);
    }

    #[tokio::test]
    async fn thread_from_here_copies_prefix_with_fresh_ids() {
        let f = fixture(Session::with_messages(
            "s",
            vec![sys(), msg("u1"), msg("a1"), msg("u2")],
        ));

        let outcome = f
            .archive
            .thread_from_here(&f.id, &MessageId::from("u1"), None)
            .await
            .unwrap();
        assert_eq!(outcome, ThreadOutcome::Applied);

        let session = load(&f).await;
        let live: Vec<String> = session.messages().iter().map(Message::text).collect();
        assert_eq!(live, vec!["be helpful", "u1"]);
        assert!(session.messages().iter().all(|m| m.id.as_str() != "u1"));
        assert_eq!(session.threads[0].timeline.messages.len(), 4);
    }

    #[tokio::test]
    async fn thread_from_here_unknown_boundary_is_noop() {
        let f = fixture(Session::with_messages("s", vec![sys()]));
        let outcome = f
            .archive
            .thread_from_here(&f.id, &MessageId::from("nope"), None)
            .await
            .unwrap();
        assert_eq!(outcome, ThreadOutcome::Unchanged);
        assert_eq!(load(&f).await.revision, 0);
    }

    #[tokio::test]
    async fn switch_thread_swaps_live_and_archived() {
        let f = fixture(Session::with_messages("s", vec![sys(), msg("first")]));
        let _ = f
            .archive
            .archive_current_timeline(&f.id, Some("second".into()))
            .await
            .unwrap();
        let first_id = load(&f).await.threads[0].id.clone();

        let outcome = f.archive.switch_thread(&f.id, &first_id).await.unwrap();
        assert_eq!(outcome, ThreadOutcome::Applied);

        let session = load(&f).await;
        assert_eq!(session.messages()[1].id.as_str(), "first");
        assert_eq!(session.thread_name.as_deref(), Some("Thread 1"));
        assert_eq!(session.threads.len(), 1);
        assert_eq!(session.threads[0].name, "second");
    }

    #[tokio::test]
    async fn switch_to_unknown_thread_is_noop() {
        let f = fixture(Session::with_messages("s", vec![sys()]));
        let outcome = f.archive.switch_thread(&f.id, &ThreadId::new()).await.unwrap();
        assert_eq!(outcome, ThreadOutcome::Unchanged);
    }

    #[tokio::test]
    async fn remove_current_pops_latest_archive() {
        let f = fixture(Session::with_messages("s", vec![sys(), msg("old")]));
        let _ = f.archive.archive_current_timeline(&f.id, None).await.unwrap();

        let _ = f.archive.remove_current_thread(&f.id).await.unwrap();
        let session = load(&f).await;
        assert!(session.threads.is_empty());
        assert_eq!(session.messages()[1].id.as_str(), "old");
    }

    #[tokio::test]
    async fn remove_current_without_archive_resets_to_system() {
        let f = fixture(Session::with_messages("s", vec![sys(), msg("u")]));
        let _ = f.archive.remove_current_thread(&f.id).await.unwrap();
        let session = load(&f).await;
        assert_eq!(session.messages().len(), 1);
        assert!(session.messages()[0].is_system());
    }

    #[tokio::test]
    async fn remove_and_rename_thread() {
        let f = fixture(Session::with_messages("s", vec![sys()]));
        let _ = f.archive.archive_current_timeline(&f.id, None).await.unwrap();
        let thread_id = load(&f).await.threads[0].id.clone();

        let renamed = f
            .archive
            .rename_thread(&f.id, &thread_id, "notes".into())
            .await
            .unwrap();
        assert_eq!(renamed, ThreadOutcome::Applied);
        assert_eq!(load(&f).await.threads[0].name, "notes");

        let removed = f.archive.remove_thread(&f.id, &thread_id).await.unwrap();
        assert_eq!(removed, ThreadOutcome::Applied);
        assert!(load(&f).await.threads.is_empty());

        let again = f.archive.remove_thread(&f.id, &thread_id).await.unwrap();
        assert_eq!(again, ThreadOutcome::Unchanged);
    }

    #[tokio::test]
    async fn rename_current_thread_is_idempotent() {
        let f = fixture(Session::with_messages("s", vec![sys()]));
        let first = f.archive.rename_current_thread(&f.id, "main".into()).await.unwrap();
        let second = f.archive.rename_current_thread(&f.id, "main".into()).await.unwrap();
        assert_eq!(first, ThreadOutcome::Applied);
        assert_eq!(second, ThreadOutcome::Unchanged);
    }
}
