//! # strand-context
//!
//! Context building and compaction for strand.
//!
//! - [`build_context`]: derive the message sequence sent to a model from a
//!   timeline and its compaction points
//! - [`token_estimator`]: character-based token estimates per tokenizer
//! - [`ContextTokensCache`]: TTL cache of context-token totals
//! - [`CompactionOrchestrator`]: decide when to compact, summarize once per
//!   session, and commit the summary atomically

#![deny(unsafe_code)]

pub mod builder;
pub mod compaction;
pub mod constants;
pub mod errors;
pub mod token_cache;
pub mod token_estimator;
pub mod tool_cleanup;

pub use builder::{BuiltContext, ContextOrigin, build_context, limit_message_count};
pub use compaction::{
    CompactionCheck, CompactionDeps, CompactionOptions, CompactionOrchestrator, CompactionOutcome,
    CompactionStatus, CompactionUiSink, CompactionUiState, ExtractiveSummarizer, ModelCatalog,
    NoopUiSink, StaticModelCatalog, SummaryGenerator, SummaryRequest,
};
pub use errors::{CompactionError, Result, SummarizerError};
pub use token_cache::{ContextTokensCache, ContextTokensCacheKey, TokenCount};
pub use token_estimator::{
    annotate_token_counts, estimate_context_tokens, estimate_message_tokens, known_token_total,
};
pub use tool_cleanup::clean_tool_calls;
