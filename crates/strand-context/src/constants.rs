//! Context subsystem constants.

// =============================================================================
// Token Estimation
// =============================================================================

/// Approximate characters per token for the default tokenizer.
pub const CHARS_PER_TOKEN: usize = 4;

/// Approximate characters per token for the `DeepSeek` tokenizer.
pub const DEEPSEEK_CHARS_PER_TOKEN: usize = 3;

/// Fixed per-message overhead (role markers, separators).
pub const MESSAGE_OVERHEAD_TOKENS: u64 = 4;

/// Minimum token estimate for any image.
pub const MIN_IMAGE_TOKENS: u64 = 85;

// =============================================================================
// Compaction
// =============================================================================

/// Prefix for the compacted summary user message.
pub const COMPACTION_SUMMARY_PREFIX: &str = "[Context from earlier in this conversation]";

/// Upper bound on characters per user message in the extractive summary.
pub const EXTRACTIVE_USER_TEXT_LIMIT: usize = 200;

// =============================================================================
// Tool-call cleanup
// =============================================================================

/// Marker prefix replacing collapsed tool calls.
pub const TOOL_CALLS_COLLAPSED_PREFIX: &str = "[tool calls omitted:";
