//! Context building: derive the message sequence sent to a model.
//!
//! [`build_context`] is pure. Given the same timeline, compaction points,
//! role filter and tool-round budget it always returns the same messages and
//! never mutates its inputs. The result records how it was derived in
//! [`ContextOrigin`], so a stale compaction boundary is visible to callers
//! instead of being silently papered over.

use strand_core::{CompactionPoint, Message, MessageRole, latest_compaction_point};
use tracing::warn;

use crate::tool_cleanup::clean_tool_calls;

/// How a context was derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextOrigin {
    /// No compaction point; the full timeline.
    Full,
    /// Summary of the latest compaction point plus everything after its
    /// boundary.
    Compacted,
    /// The latest compaction boundary is gone from the timeline; fell back to
    /// the full timeline.
    StaleFallback,
}

/// Result of [`build_context`].
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltContext {
    /// Messages in send order.
    pub messages: Vec<Message>,
    /// How the messages were derived.
    pub origin: ContextOrigin,
}

/// Derive the effective context for a timeline.
///
/// 1. Messages still generating are dropped.
/// 2. With a usable latest compaction point: the summary message (if still
///    present) followed by every non-summary message after the boundary.
///    Otherwise the full timeline.
/// 3. The timeline's system prompt is put back at the head if missing.
/// 4. With a role filter, disallowed roles are dropped except the system
///    prompt and the last user message.
/// 5. Tool calls older than `keep_tool_call_rounds` rounds are collapsed.
pub fn build_context(
    messages: &[Message],
    compaction_points: &[CompactionPoint],
    role_filter: Option<&[MessageRole]>,
    keep_tool_call_rounds: usize,
) -> BuiltContext {
    let complete: Vec<&Message> = messages.iter().filter(|m| !m.generating).collect();

    let (mut selected, origin) = match latest_compaction_point(compaction_points) {
        None => (complete.clone(), ContextOrigin::Full),
        Some(point) => {
            match complete
                .iter()
                .position(|m| m.id == point.boundary_message_id)
            {
                Some(boundary) => {
                    let summary = complete
                        .iter()
                        .find(|m| m.id == point.summary_message_id)
                        .copied();
                    let after = complete[boundary + 1..]
                        .iter()
                        .copied()
                        .filter(|m| !m.is_summary);
                    (summary.into_iter().chain(after).collect(), ContextOrigin::Compacted)
                }
                None => {
                    warn!(
                        boundary = %point.boundary_message_id,
                        "compaction boundary not in timeline, using full context"
                    );
                    (complete.clone(), ContextOrigin::StaleFallback)
                }
            }
        }
    };

    let system = complete.first().copied().filter(|m| m.is_system());
    if let Some(system) = system {
        if !selected.iter().any(|m| m.id == system.id) {
            selected.insert(0, system);
        }
    }

    if let Some(allowed) = role_filter {
        selected = filter_roles(selected, allowed, system);
    }

    let owned = selected.into_iter().cloned().collect();
    BuiltContext {
        messages: clean_tool_calls(owned, keep_tool_call_rounds),
        origin,
    }
}

fn filter_roles<'a>(
    messages: Vec<&'a Message>,
    allowed: &[MessageRole],
    system: Option<&Message>,
) -> Vec<&'a Message> {
    let last_user = messages.iter().rposition(|m| m.is_user());
    messages
        .into_iter()
        .enumerate()
        .filter(|(i, m)| {
            allowed.contains(&m.role)
                || Some(*i) == last_user
                || system.is_some_and(|s| s.id == m.id)
        })
        .map(|(_, m)| m)
        .collect()
}

/// Keep the leading system prompt plus the last `max` other messages.
/// `None` keeps everything.
pub fn limit_message_count(messages: Vec<Message>, max: Option<usize>) -> Vec<Message> {
    let Some(max) = max else {
        return messages;
    };
    let mut iter = messages.into_iter().peekable();
    let system = iter.next_if(Message::is_system);
    let rest: Vec<Message> = iter.collect();
    let skip = rest.len().saturating_sub(max);
    system.into_iter().chain(rest.into_iter().skip(skip)).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
