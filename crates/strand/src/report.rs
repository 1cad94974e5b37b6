//! JSON report printed by the CLI.

use serde::Serialize;
use strand_context::{BuiltContext, CompactionCheck, CompactionOutcome, ContextOrigin, TokenCount};
use strand_core::SessionId;

/// What the CLI found out about a session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub session_id: SessionId,
    pub origin: &'static str,
    pub context_messages: usize,
    pub context_tokens: u64,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compaction: Option<CompactionOutcome>,
}

/// The compaction decision in reportable form.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Decision {
    Disabled,
    NoModel,
    #[serde(rename_all = "camelCase")]
    Evaluated {
        estimated_tokens: u64,
        context_window: u64,
        threshold: f64,
        needs_compaction: bool,
    },
}

impl From<&CompactionCheck> for Decision {
    fn from(check: &CompactionCheck) -> Self {
        match check {
            CompactionCheck::Disabled => Self::Disabled,
            CompactionCheck::NoModel => Self::NoModel,
            CompactionCheck::Evaluated {
                tokens,
                context_window,
                threshold,
                needed,
            } => Self::Evaluated {
                estimated_tokens: tokens.value(),
                context_window: *context_window,
                threshold: *threshold,
                needs_compaction: *needed,
            },
        }
    }
}

impl Report {
    pub fn new(
        session_id: SessionId,
        context: &BuiltContext,
        tokens: TokenCount,
        check: &CompactionCheck,
    ) -> Self {
        Self {
            session_id,
            origin: origin_name(context.origin),
            context_messages: context.messages.len(),
            context_tokens: tokens.value(),
            decision: check.into(),
            compaction: None,
        }
    }
}

fn origin_name(origin: ContextOrigin) -> &'static str {
    match origin {
        ContextOrigin::Full => "full",
        ContextOrigin::Compacted => "compacted",
        ContextOrigin::StaleFallback => "staleFallback",
    }
}
