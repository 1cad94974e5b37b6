//! Collaborators the compaction orchestrator depends on.
//!
//! - [`SummaryGenerator`]: produces the summary text (usually a model call)
//! - [`ModelCatalog`]: context-window lookup
//! - [`CompactionUiSink`]: fire-and-forget UI state notifications
//!
//! [`ExtractiveSummarizer`] is a model-free fallback summarizer.

use std::collections::HashMap;

use async_trait::async_trait;
use strand_core::{ContentPart, Message, MessageRole, SessionId};

use crate::compaction::state::CompactionUiState;
use crate::constants::EXTRACTIVE_USER_TEXT_LIMIT;
use crate::errors::SummarizerError;

// =============================================================================
// Summary generation
// =============================================================================

/// Input to one summarization call.
pub struct SummaryRequest<'a> {
    /// Session being compacted.
    pub session_id: &'a SessionId,
    /// Messages to condense, in order.
    pub messages: &'a [Message],
    /// Receives the partial summary text as it streams.
    pub on_partial_text: &'a (dyn Fn(&str) + Send + Sync),
}

/// Produces a summary for a compaction. Invoked once per admitted
/// compaction.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    /// Summarize `request.messages`, returning the summary text.
    async fn generate_summary(
        &self,
        request: SummaryRequest<'_>,
    ) -> Result<String, SummarizerError>;
}

/// Model-free summarizer: the user's requests plus the tools that were used.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    /// Create a new extractive summarizer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SummaryGenerator for ExtractiveSummarizer {
    async fn generate_summary(
        &self,
        request: SummaryRequest<'_>,
    ) -> Result<String, SummarizerError> {
        let mut requests = Vec::new();
        let mut tools: Vec<&str> = Vec::new();

        for message in request.messages {
            match message.role {
                MessageRole::User => {
                    let text = message.text();
                    let text = text.trim();
                    if !text.is_empty() {
                        requests.push(truncate(text, EXTRACTIVE_USER_TEXT_LIMIT));
                    }
                }
                MessageRole::Assistant => {
                    for part in &message.content_parts {
                        if let ContentPart::ToolCall { tool_name, .. } = part {
                            if !tools.contains(&tool_name.as_str()) {
                                tools.push(tool_name);
                            }
                        }
                    }
                }
                MessageRole::System => {}
            }
        }

        if requests.is_empty() && tools.is_empty() {
            return Err(SummarizerError::Empty);
        }

        let mut summary = String::from("The user asked:\n");
        for r in &requests {
            summary.push_str("- ");
            summary.push_str(r);
            summary.push('\n');
        }
        if !tools.is_empty() {
            summary.push_str("Tools used: ");
            summary.push_str(&tools.join(", "));
            summary.push('\n');
        }
        (request.on_partial_text)(&summary);
        Ok(summary)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

// =============================================================================
// Model catalog
// =============================================================================

/// Context-window lookup.
#[cfg_attr(test, mockall::automock)]
pub trait ModelCatalog: Send + Sync {
    /// Context window in tokens for `model` of `provider`, if known.
    fn context_window(&self, provider: &str, model: &str) -> Option<u64>;
}

/// Catalog backed by a fixed table.
#[derive(Clone, Debug, Default)]
pub struct StaticModelCatalog {
    windows: HashMap<(String, String), u64>,
}

impl StaticModelCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model (builder style).
    #[must_use]
    pub fn with_model(mut self, provider: &str, model: &str, context_window: u64) -> Self {
        let _ = self
            .windows
            .insert((provider.to_owned(), model.to_owned()), context_window);
        self
    }
}

impl ModelCatalog for StaticModelCatalog {
    fn context_window(&self, provider: &str, model: &str) -> Option<u64> {
        self.windows
            .get(&(provider.to_owned(), model.to_owned()))
            .copied()
    }
}

// =============================================================================
// UI sink
// =============================================================================

/// Receives compaction UI state. Fire-and-forget.
pub trait CompactionUiSink: Send + Sync {
    /// Publish the state for a session.
    fn set_compaction_ui_state(&self, session_id: &SessionId, state: &CompactionUiState);
}

/// Sink that discards every update.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopUiSink;

impl CompactionUiSink for NoopUiSink {
    fn set_compaction_ui_state(&self, _session_id: &SessionId, _state: &CompactionUiState) {}
}
