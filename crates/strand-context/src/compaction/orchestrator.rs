//! Compaction orchestrator: decide, summarize once, commit atomically.
//!
//! ## Decision
//!
//! [`CompactionOrchestrator::check_compaction`] resolves per-session settings
//! over the global ones, builds the context, and compares its token total
//! against `context_window * threshold`. The total comes from the
//! [`ContextTokensCache`]; on a miss only the per-message counts already
//! known are summed, the full estimate is never run on this path.
//!
//! ## Execution
//!
//! At most one compaction runs per session. Admission is a synchronous
//! insert into the orchestrator's in-flight set, and the marker is removed by
//! a drop guard on every exit path, including a panicking summarizer. The
//! summary message and its compaction point are committed in one store
//! patch; on any failure the session is left as it was.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use futures::FutureExt;
use serde::Serialize;
use strand_core::{CompactionPoint, Message, MessageId, MessageRole, Session, SessionId, TokenizerKind};
use strand_session::{
    GenerationRegistry, PatchResult, SessionStore, ThreadArchive, ThreadOutcome,
};
use strand_settings::StrandSettings;
use tracing::{debug, info, instrument, warn};

use crate::builder::{BuiltContext, build_context, limit_message_count};
use crate::compaction::state::{CompactionStatus, CompactionUiState};
use crate::compaction::traits::{CompactionUiSink, ModelCatalog, SummaryGenerator, SummaryRequest};
use crate::constants::COMPACTION_SUMMARY_PREFIX;
use crate::errors::{CompactionError, Result, SummarizerError};
use crate::token_cache::{ContextTokensCache, ContextTokensCacheKey, TokenCount};
use crate::token_estimator::annotate_token_counts;

// =============================================================================
// Public types
// =============================================================================

/// Collaborators injected into the orchestrator.
pub struct CompactionDeps {
    /// Session store.
    pub store: Arc<dyn SessionStore>,
    /// Summary generator.
    pub summarizer: Arc<dyn SummaryGenerator>,
    /// Context-window lookup.
    pub catalog: Arc<dyn ModelCatalog>,
    /// UI state sink.
    pub ui: Arc<dyn CompactionUiSink>,
    /// In-flight generations, cancelled when compression archives the live
    /// timeline.
    pub generations: Arc<GenerationRegistry>,
}

/// Options for [`CompactionOrchestrator::run_compaction`].
#[derive(Clone, Debug, Default)]
pub struct CompactionOptions {
    /// Skip the `needs_compaction` check.
    pub force: bool,
    /// Summarize up to this message instead of the last one.
    pub boundary_message_id: Option<MessageId>,
}

impl CompactionOptions {
    /// Forced compaction up to the last message.
    pub fn forced() -> Self {
        Self {
            force: true,
            boundary_message_id: None,
        }
    }
}

/// Result of a compaction request. Failures are reported here rather than
/// raised.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionOutcome {
    /// False only if the compaction was attempted and failed.
    pub success: bool,
    /// Whether a summary was committed.
    pub compacted: bool,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompactionOutcome {
    /// Not needed, nothing to do, or already running.
    pub fn skipped() -> Self {
        Self {
            success: true,
            compacted: false,
            error: None,
        }
    }

    fn finished(compacted: bool) -> Self {
        Self {
            success: true,
            compacted,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            compacted: false,
            error: Some(error),
        }
    }
}

/// Outcome of the compaction decision.
#[derive(Clone, Debug, PartialEq)]
pub enum CompactionCheck {
    /// Auto-compaction is off for the session.
    Disabled,
    /// The session has no model configured.
    NoModel,
    /// Tokens were compared against the window.
    Evaluated {
        /// Context token total and its provenance.
        tokens: TokenCount,
        /// Model context window.
        context_window: u64,
        /// Threshold fraction applied.
        threshold: f64,
        /// Whether the total exceeds `context_window * threshold`.
        needed: bool,
    },
}

impl CompactionCheck {
    /// Whether compaction should run.
    pub fn needed(&self) -> bool {
        matches!(self, Self::Evaluated { needed: true, .. })
    }
}

/// Per-session settings resolved over the global defaults.
#[derive(Clone, Debug)]
struct ResolvedSettings {
    auto_compaction: bool,
    threshold: f64,
    max_context_message_count: Option<usize>,
    role_filter: Option<Vec<MessageRole>>,
    tokenizer: TokenizerKind,
    model: Option<(String, String)>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs compactions and tracks their UI state per session.
pub struct CompactionOrchestrator {
    store: Arc<dyn SessionStore>,
    summarizer: Arc<dyn SummaryGenerator>,
    catalog: Arc<dyn ModelCatalog>,
    ui: Arc<dyn CompactionUiSink>,
    threads: ThreadArchive,
    settings: StrandSettings,
    cache: ContextTokensCache,
    in_flight: DashSet<SessionId>,
    ui_states: DashMap<SessionId, CompactionUiState>,
}

impl CompactionOrchestrator {
    /// Create an orchestrator.
    pub fn new(deps: CompactionDeps, settings: StrandSettings) -> Self {
        let ttl = Duration::from_secs(settings.compaction.token_cache_ttl_secs);
        Self {
            threads: ThreadArchive::new(Arc::clone(&deps.store), deps.generations),
            store: deps.store,
            summarizer: deps.summarizer,
            catalog: deps.catalog,
            ui: deps.ui,
            settings,
            cache: ContextTokensCache::new(ttl),
            in_flight: DashSet::new(),
            ui_states: DashMap::new(),
        }
    }

    /// The context-token cache.
    pub fn cache(&self) -> &ContextTokensCache {
        &self.cache
    }

    /// Last published UI state for a session (idle if none).
    pub fn ui_state(&self, session_id: &SessionId) -> CompactionUiState {
        self.ui_states
            .get(session_id)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Whether a compaction is in flight for a session.
    pub fn is_compacting(&self, session_id: &SessionId) -> bool {
        self.in_flight.contains(session_id)
    }

    /// The context that would be sent for a session right now.
    pub async fn session_context(&self, session_id: &SessionId) -> Result<BuiltContext> {
        let session = self.load(session_id).await?;
        let resolved = self.resolve(&session);
        Ok(self.context_for(&session, &resolved))
    }

    /// Exact token total of a session's context, cached.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn context_tokens(&self, session_id: &SessionId) -> Result<TokenCount> {
        let session = self.load(session_id).await?;
        let resolved = self.resolve(&session);
        let context = self.context_for(&session, &resolved).messages;
        let key = cache_key(session_id, &session, &resolved, &context);
        Ok(self.cache.get_or_compute(key, &context))
    }

    /// Evaluate whether a session's context overflows.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn check_compaction(&self, session_id: &SessionId) -> Result<CompactionCheck> {
        let session = self.load(session_id).await?;
        let resolved = self.resolve(&session);

        if !resolved.auto_compaction {
            debug!("auto-compaction disabled");
            return Ok(CompactionCheck::Disabled);
        }
        let Some((provider, model)) = resolved.model.as_ref() else {
            debug!("no model configured");
            return Ok(CompactionCheck::NoModel);
        };

        let context = self.context_for(&session, &resolved).messages;
        let key = cache_key(session_id, &session, &resolved, &context);
        let tokens = self.cache.cached_or_estimate(key, &context);
        let context_window = self
            .catalog
            .context_window(provider, model)
            .unwrap_or(self.settings.compaction.default_context_window);
        let needed = exceeds(tokens.value(), context_window, resolved.threshold);

        debug!(
            tokens = tokens.value(),
            context_window,
            threshold = resolved.threshold,
            needed,
            "compaction check"
        );
        Ok(CompactionCheck::Evaluated {
            tokens,
            context_window,
            threshold: resolved.threshold,
            needed,
        })
    }

    /// Whether compaction should run. A missing session or a store failure
    /// answers `false`.
    pub async fn needs_compaction(&self, session_id: &SessionId) -> bool {
        match self.check_compaction(session_id).await {
            Ok(check) => check.needed(),
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "compaction check failed");
                false
            }
        }
    }

    /// Summarize the session's context and commit a compaction point.
    ///
    /// A concurrent call for the same session returns
    /// [`CompactionOutcome::skipped`] without summarizing.
    #[instrument(skip(self, options), fields(session_id = %session_id, force = options.force))]
    pub async fn run_compaction(
        &self,
        session_id: &SessionId,
        options: CompactionOptions,
    ) -> CompactionOutcome {
        if !options.force && !self.needs_compaction(session_id).await {
            debug!("compaction not needed");
            return CompactionOutcome::skipped();
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, session_id) else {
            debug!("compaction already in flight");
            return CompactionOutcome::skipped();
        };
        self.run_guarded(session_id, self.compact(session_id, options.boundary_message_id))
            .await
    }

    /// Summarize the context, archive the live timeline, and continue in a
    /// new one holding the system prompt and the summary.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn compress_to_new_thread(&self, session_id: &SessionId) -> CompactionOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, session_id) else {
            debug!("compaction already in flight");
            return CompactionOutcome::skipped();
        };
        self.run_guarded(session_id, self.compress(session_id)).await
    }

    // ── execution ───────────────────────────────────────────────────────────

    async fn run_guarded<F>(&self, session_id: &SessionId, work: F) -> CompactionOutcome
    where
        F: Future<Output = Result<bool>>,
    {
        self.set_status(session_id, CompactionStatus::Running);

        let result = AssertUnwindSafe(work)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(CompactionError::Panicked(panic_message(&*panic))));

        match result {
            Ok(compacted) => {
                self.set_status(session_id, CompactionStatus::Idle);
                CompactionOutcome::finished(compacted)
            }
            Err(e) => {
                warn!(error = %e, category = e.category(), "compaction failed");
                let error = e.to_string();
                self.set_status(
                    session_id,
                    CompactionStatus::Failed {
                        error: error.clone(),
                    },
                );
                CompactionOutcome::failed(error)
            }
        }
    }

    async fn compact(&self, session_id: &SessionId, boundary: Option<MessageId>) -> Result<bool> {
        let session = self.load(session_id).await?;
        let resolved = self.resolve(&session);

        let boundary = match boundary {
            Some(id) if session.timeline.contains(&id) => id,
            Some(id) => return Err(CompactionError::BoundaryNotFound(id)),
            None => match last_compactable(&session.timeline.messages) {
                Some(id) => id,
                None => {
                    debug!("timeline has nothing to compact");
                    return Ok(false);
                }
            },
        };
        if session
            .timeline
            .latest_compaction_point()
            .is_some_and(|p| p.boundary_message_id == boundary)
        {
            debug!(boundary = %boundary, "already compacted up to boundary");
            return Ok(false);
        }

        let context = self.context_for(&session, &resolved).messages;
        let to_summarize = match context.iter().position(|m| m.id == boundary) {
            Some(idx) => context[..=idx].to_vec(),
            None => context,
        };
        if to_summarize.iter().all(Message::is_system) {
            debug!("context has nothing to summarize");
            return Ok(false);
        }

        let text = self.summarize(session_id, &to_summarize).await?;
        let summary = counted_summary(&text, resolved.tokenizer);
        let point = CompactionPoint {
            boundary_message_id: boundary.clone(),
            summary_message_id: summary.id.clone(),
            created_at: Utc::now(),
        };

        let patch = Box::new(move |session: &mut Session| {
            if !session.timeline.contains(&point.boundary_message_id) {
                return false;
            }
            session.timeline.messages.push(summary);
            session.timeline.compaction_points.push(point);
            true
        });
        match self.store.update_session(session_id, patch).await? {
            PatchResult::Committed(session) => {
                info!(
                    boundary = %boundary,
                    summarized = to_summarize.len(),
                    revision = session.revision,
                    "compaction committed"
                );
                Ok(true)
            }
            PatchResult::Unchanged => Err(CompactionError::BoundaryNotFound(boundary)),
        }
    }

    async fn compress(&self, session_id: &SessionId) -> Result<bool> {
        let session = self.load(session_id).await?;
        let resolved = self.resolve(&session);
        let context = self.context_for(&session, &resolved).messages;
        if context.iter().all(Message::is_system) {
            debug!("context has nothing to compress");
            return Ok(false);
        }

        let text = self.summarize(session_id, &context).await?;
        let outcome = self
            .threads
            .archive_with_seed(session_id, vec![counted_summary(&text, resolved.tokenizer)], None)
            .await?;
        if outcome == ThreadOutcome::Applied {
            info!(summarized = context.len(), "compressed into new thread");
        }
        Ok(outcome == ThreadOutcome::Applied)
    }

    async fn summarize(&self, session_id: &SessionId, messages: &[Message]) -> Result<String> {
        let on_partial = |text: &str| self.publish_partial(session_id, text);
        let text = self
            .summarizer
            .generate_summary(SummaryRequest {
                session_id,
                messages,
                on_partial_text: &on_partial,
            })
            .await?;
        if text.trim().is_empty() {
            return Err(SummarizerError::Empty.into());
        }
        Ok(text)
    }

    // ── state ───────────────────────────────────────────────────────────────

    fn set_status(&self, session_id: &SessionId, next: CompactionStatus) {
        let snapshot = {
            let mut state = self.ui_states.entry(session_id.clone()).or_default();
            if let Err(e) = state.status.transition(next) {
                warn!(session_id = %session_id, error = %e, "compaction state not updated");
                return;
            }
            state.streaming_text.clear();
            state.value().clone()
        };
        self.ui.set_compaction_ui_state(session_id, &snapshot);
    }

    fn publish_partial(&self, session_id: &SessionId, text: &str) {
        let snapshot = {
            let Some(mut state) = self.ui_states.get_mut(session_id) else {
                return;
            };
            if !state.status.is_running() {
                return;
            }
            text.clone_into(&mut state.streaming_text);
            state.value().clone()
        };
        self.ui.set_compaction_ui_state(session_id, &snapshot);
    }

    // ── helpers ─────────────────────────────────────────────────────────────

    async fn load(&self, session_id: &SessionId) -> Result<Session> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| CompactionError::SessionNotFound(session_id.clone()))
    }

    fn resolve(&self, session: &Session) -> ResolvedSettings {
        let overrides = &session.settings;
        let compaction = &self.settings.compaction;
        let context = &self.settings.context;
        ResolvedSettings {
            auto_compaction: overrides
                .auto_compaction
                .unwrap_or(compaction.auto_compaction),
            threshold: overrides
                .compaction_threshold
                .filter(|t| *t > 0.0 && *t <= 1.0)
                .unwrap_or(compaction.threshold),
            max_context_message_count: overrides
                .max_context_message_count
                .or(context.max_context_message_count),
            role_filter: overrides.role_filter.clone(),
            tokenizer: overrides.tokenizer.unwrap_or(context.tokenizer),
            model: overrides.provider.clone().zip(overrides.model.clone()),
        }
    }

    fn context_for(&self, session: &Session, resolved: &ResolvedSettings) -> BuiltContext {
        let built = build_context(
            &session.timeline.messages,
            &session.timeline.compaction_points,
            resolved.role_filter.as_deref(),
            self.settings.compaction.keep_tool_call_rounds,
        );
        BuiltContext {
            messages: limit_message_count(built.messages, resolved.max_context_message_count),
            origin: built.origin,
        }
    }
}

/// Removes the session from the in-flight set when dropped.
struct InFlightGuard<'a> {
    in_flight: &'a DashSet<SessionId>,
    session_id: SessionId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(in_flight: &'a DashSet<SessionId>, session_id: &SessionId) -> Option<Self> {
        in_flight.insert(session_id.clone()).then(|| Self {
            in_flight,
            session_id: session_id.clone(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let _ = self.in_flight.remove(&self.session_id);
    }
}

fn cache_key(
    session_id: &SessionId,
    session: &Session,
    resolved: &ResolvedSettings,
    context: &[Message],
) -> ContextTokensCacheKey {
    ContextTokensCacheKey::for_context(
        session_id,
        resolved.max_context_message_count,
        context,
        &session.timeline.compaction_points,
        resolved.tokenizer,
    )
}

#[allow(clippy::cast_precision_loss)]
fn exceeds(tokens: u64, context_window: u64, threshold: f64) -> bool {
    tokens as f64 > context_window as f64 * threshold
}

/// Last finished, non-summary message.
fn last_compactable(messages: &[Message]) -> Option<MessageId> {
    messages
        .iter()
        .rev()
        .find(|m| !m.is_summary && !m.generating && !m.is_system())
        .map(|m| m.id.clone())
}

/// The synthetic user message carrying a summary.
pub fn summary_message(text: &str) -> Message {
    let mut message = Message::user(format!("{COMPACTION_SUMMARY_PREFIX}\n\n{text}"));
    message.is_summary = true;
    message
}

/// A summary message carrying its own token estimate, so the known-count
/// total includes it right after commit.
fn counted_summary(text: &str, tokenizer: TokenizerKind) -> Message {
    let mut summary = summary_message(text);
    let _ = annotate_token_counts(std::slice::from_mut(&mut summary), tokenizer);
    summary
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

// =============================================================================
// Tests
// =============================================================================
