//! Memoized context-token totals.
//!
//! Entries are keyed by a structural tuple: session, message-count limit,
//! last context message, latest compaction boundary and tokenizer. Any change
//! to one of those fields produces a different key, so there is no explicit
//! invalidation; stale entries simply stop being looked up. Every insert
//! first evicts the entries older than the TTL, so superseded keys do not
//! accumulate.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use strand_core::{CompactionPoint, Message, MessageId, SessionId, TokenizerKind, latest_compaction_point};
use tracing::trace;

use crate::token_estimator::{estimate_context_tokens, known_token_total};

/// Structural cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextTokensCacheKey {
    /// Session the context belongs to.
    pub session_id: SessionId,
    /// Message-count limit the context was built with.
    pub max_context_message_count: Option<usize>,
    /// ID of the last message in the context.
    pub last_context_message_id: Option<MessageId>,
    /// Boundary of the latest compaction point (first-seen maximum on ties).
    pub latest_compaction_boundary_id: Option<MessageId>,
    /// Tokenizer the total is measured in.
    pub tokenizer: TokenizerKind,
}

impl ContextTokensCacheKey {
    /// Derive the key for a built context.
    pub fn for_context(
        session_id: &SessionId,
        max_context_message_count: Option<usize>,
        context: &[Message],
        compaction_points: &[CompactionPoint],
        tokenizer: TokenizerKind,
    ) -> Self {
        Self {
            session_id: session_id.clone(),
            max_context_message_count,
            last_context_message_id: context.last().map(|m| m.id.clone()),
            latest_compaction_boundary_id: latest_compaction_point(compaction_points)
                .map(|p| p.boundary_message_id.clone()),
            tokenizer,
        }
    }
}

/// Cached token total for one context.
#[derive(Clone, Debug)]
pub struct ContextTokensCacheEntry {
    /// Token total.
    pub context_tokens: u64,
    /// Number of messages the total covers.
    pub message_count: usize,
    /// When the entry was written.
    pub timestamp: Instant,
    /// Whether the total is a best-effort aggregate of known counts.
    pub estimated: bool,
}

/// Token total together with how it was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenCount {
    /// Served from the cache.
    Cached(u64),
    /// Best-effort sum of the per-message counts already known.
    Estimated(u64),
    /// Computed in full just now.
    Fresh(u64),
}

impl TokenCount {
    /// The token total regardless of provenance.
    pub fn value(self) -> u64 {
        match self {
            Self::Cached(n) | Self::Estimated(n) | Self::Fresh(n) => n,
        }
    }

    /// Whether this is an exact computation rather than a cache hit or an
    /// aggregate.
    pub fn is_fresh(self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// Process-local TTL map of context-token totals.
#[derive(Debug)]
pub struct ContextTokensCache {
    entries: DashMap<ContextTokensCacheKey, ContextTokensCacheEntry>,
    ttl: Duration,
}

impl ContextTokensCache {
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Look up a live entry. Expired entries are removed and reported as a
    /// miss.
    pub fn get(&self, key: &ContextTokensCacheKey) -> Option<ContextTokensCacheEntry> {
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if entry.timestamp.elapsed() >= self.ttl {
            let _ = self.entries.remove(key);
            return None;
        }
        Some(entry)
    }

    /// Store a total, evicting expired entries first.
    pub fn insert(
        &self,
        key: ContextTokensCacheKey,
        context_tokens: u64,
        message_count: usize,
        estimated: bool,
    ) {
        let evicted = self.purge_expired();
        if evicted > 0 {
            trace!(evicted, "expired context token entries evicted");
        }
        let _ = self.entries.insert(
            key,
            ContextTokensCacheEntry {
                context_tokens,
                message_count,
                timestamp: Instant::now(),
                estimated,
            },
        );
    }

    /// Cached total, or on a miss the best-effort aggregate of known
    /// per-message counts (which is then cached). Never runs the full
    /// estimate.
    pub fn cached_or_estimate(
        &self,
        key: ContextTokensCacheKey,
        context: &[Message],
    ) -> TokenCount {
        if let Some(entry) = self.get(&key) {
            trace!(tokens = entry.context_tokens, "context token cache hit");
            return TokenCount::Cached(entry.context_tokens);
        }
        let tokens = known_token_total(context, key.tokenizer);
        trace!(tokens, "context token cache miss, using known counts");
        self.insert(key, tokens, context.len(), true);
        TokenCount::Estimated(tokens)
    }

    /// Cached exact total, or the full estimate computed now and cached.
    /// Entries written by [`Self::cached_or_estimate`] are recomputed.
    pub fn get_or_compute(&self, key: ContextTokensCacheKey, context: &[Message]) -> TokenCount {
        if let Some(entry) = self.get(&key).filter(|e| !e.estimated) {
            return TokenCount::Cached(entry.context_tokens);
        }
        let tokens = estimate_context_tokens(context, key.tokenizer);
        trace!(tokens, messages = context.len(), "context tokens computed");
        self.insert(key, tokens, context.len(), false);
        TokenCount::Fresh(tokens)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.timestamp.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    /// Drop every entry of one session.
    pub fn remove_session(&self, session_id: &SessionId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| &key.session_id != session_id);
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
