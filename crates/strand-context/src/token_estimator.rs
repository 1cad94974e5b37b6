//! Character-based token estimation.
//!
//! Estimates are per tokenizer family and only comparable within one
//! [`TokenizerKind`]. [`known_token_total`] is the cheap best-effort
//! aggregate of counts already stored on messages; [`estimate_context_tokens`]
//! is the full computation.

use strand_core::{ContentPart, Message, TokenizerKind};

use crate::constants::{
    CHARS_PER_TOKEN, DEEPSEEK_CHARS_PER_TOKEN, MESSAGE_OVERHEAD_TOKENS, MIN_IMAGE_TOKENS,
};

fn chars_per_token(kind: TokenizerKind) -> usize {
    match kind {
        TokenizerKind::Default => CHARS_PER_TOKEN,
        TokenizerKind::Deepseek => DEEPSEEK_CHARS_PER_TOKEN,
    }
}

fn chars_to_tokens(chars: usize, kind: TokenizerKind) -> u64 {
    chars.div_ceil(chars_per_token(kind)) as u64
}

/// Estimate the tokens of one content part.
pub fn estimate_part_tokens(part: &ContentPart, kind: TokenizerKind) -> u64 {
    match part {
        ContentPart::Text { text } | ContentPart::Reasoning { text } => {
            chars_to_tokens(text.len(), kind)
        }
        ContentPart::Image { .. } => MIN_IMAGE_TOKENS,
        ContentPart::ToolCall {
            tool_name,
            args,
            result,
            ..
        } => {
            let chars = tool_name.len()
                + args.to_string().len()
                + result.as_ref().map_or(0, |r| r.to_string().len());
            chars_to_tokens(chars, kind)
        }
    }
}

/// Estimate the tokens of one message, ignoring any stored count.
pub fn estimate_message_tokens(message: &Message, kind: TokenizerKind) -> u64 {
    MESSAGE_OVERHEAD_TOKENS
        + message
            .content_parts
            .iter()
            .map(|part| estimate_part_tokens(part, kind))
            .sum::<u64>()
}

/// Full estimate for a context: stored counts where present, computed
/// otherwise.
pub fn estimate_context_tokens(messages: &[Message], kind: TokenizerKind) -> u64 {
    messages
        .iter()
        .map(|m| {
            m.token_count(kind)
                .unwrap_or_else(|| estimate_message_tokens(m, kind))
        })
        .sum()
}

/// Sum of the token counts already stored on `messages`. Messages without a
/// count contribute nothing.
pub fn known_token_total(messages: &[Message], kind: TokenizerKind) -> u64 {
    messages.iter().filter_map(|m| m.token_count(kind)).sum()
}

/// Store an estimate on every finished message lacking a count for `kind`.
/// Returns the number of messages annotated.
pub fn annotate_token_counts(messages: &mut [Message], kind: TokenizerKind) -> usize {
    let mut annotated = 0;
    for message in messages.iter_mut().filter(|m| !m.generating) {
        if message.token_count(kind).is_none() {
            let estimate = estimate_message_tokens(message, kind);
            let _ = message.token_counts.insert(kind, estimate);
            annotated += 1;
        }
    }
    annotated
}
