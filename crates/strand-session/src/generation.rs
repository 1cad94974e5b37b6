//! Cancellation hooks for in-progress message generation.
//!
//! The generator registers a token per streaming message. Archiving or
//! switching away from the live timeline cancels every registered token
//! synchronously; a generator whose token was cancelled must drop its result.

use dashmap::DashMap;
use strand_core::{Message, MessageId};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cancellation tokens keyed by the message being generated.
#[derive(Debug, Default)]
pub struct GenerationRegistry {
    tokens: DashMap<MessageId, CancellationToken>,
}

impl GenerationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generation for `message_id` and return its token.
    ///
    /// Registering an ID twice replaces (and cancels) the older token.
    pub fn register(&self, message_id: &MessageId) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(old) = self.tokens.insert(message_id.clone(), token.clone()) {
            old.cancel();
        }
        token
    }

    /// Finish a generation. Returns `true` if its result may be applied,
    /// `false` if it was cancelled or never registered.
    pub fn finish(&self, message_id: &MessageId) -> bool {
        self.tokens
            .remove(message_id)
            .is_some_and(|(_, token)| !token.is_cancelled())
    }

    /// Whether a live generation is registered for `message_id`.
    pub fn is_active(&self, message_id: &MessageId) -> bool {
        self.tokens
            .get(message_id)
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Cancel the generation for one message.
    pub fn cancel(&self, message_id: &MessageId) -> bool {
        match self.tokens.remove(message_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every generation belonging to `messages`. Returns how many were
    /// cancelled.
    pub fn cancel_all<'a>(&self, messages: impl IntoIterator<Item = &'a Message>) -> usize {
        let cancelled = messages
            .into_iter()
            .filter(|m| self.cancel(&m.id))
            .count();
        if cancelled > 0 {
            debug!(cancelled, "cancelled in-flight generations");
        }
        cancelled
    }

    /// Number of registered generations.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no generation is registered.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
