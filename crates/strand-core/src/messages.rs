//! Message types for the conversation timeline.
//!
//! A [`Message`] is one node in a timeline. Its body is a list of
//! [`ContentPart`]s so assistant turns can interleave text, reasoning and
//! tool calls. Attachments are referenced by opaque storage keys; their
//! content is fetched lazily by whoever renders or sends them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::MessageId;

// ─────────────────────────────────────────────────────────────────────────────
// Roles and tokenizers
// ─────────────────────────────────────────────────────────────────────────────

/// Author role of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// Human input.
    User,
    /// Model output.
    Assistant,
}

/// Tokenizer family used when counting tokens.
///
/// Counts are only comparable within one kind, so per-message counts and
/// cache keys are both scoped by it.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// General-purpose BPE estimate.
    #[default]
    Default,
    /// `DeepSeek` family tokenizer estimate.
    Deepseek,
}

// ─────────────────────────────────────────────────────────────────────────────
// Content
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a tool call embedded in an assistant message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallState {
    /// Issued, result pending.
    Call,
    /// Completed with a result.
    Result,
    /// Failed.
    Error,
}

/// One block of message content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Image stored out of band.
    Image {
        /// Opaque storage key.
        #[serde(rename = "storageKey")]
        storage_key: String,
    },
    /// Model reasoning / thinking text.
    Reasoning {
        /// The reasoning text.
        text: String,
    },
    /// A tool invocation and (once available) its result.
    ToolCall {
        /// Tool call ID.
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Tool name.
        #[serde(rename = "toolName")]
        tool_name: String,
        /// Tool arguments.
        #[serde(default)]
        args: Value,
        /// Tool result, once the call completed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Call state.
        state: ToolCallState,
    },
}

impl ContentPart {
    /// Create a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Whether this part is a tool call.
    #[must_use]
    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }

    /// Text content, if this is a text part.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// File attachment reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFile {
    /// Attachment ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// MIME type, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    /// Storage key of the extracted content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
}

/// Link attachment reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageLink {
    /// Attachment ID.
    pub id: String,
    /// Target URL.
    pub url: String,
    /// Page title, if fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Storage key of the fetched page content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────────────────

/// A single node in a timeline.
///
/// Mutated in place while `generating` is true, immutable afterwards
/// (except for deletion).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID.
    pub id: MessageId,
    /// Author role.
    pub role: MessageRole,
    /// Ordered content blocks.
    #[serde(default)]
    pub content_parts: Vec<ContentPart>,
    /// True while the model is still streaming into this message.
    #[serde(default)]
    pub generating: bool,
    /// True for synthetic compaction summaries.
    #[serde(default)]
    pub is_summary: bool,
    /// File attachments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<MessageFile>,
    /// Link attachments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<MessageLink>,
    /// Known token counts per tokenizer.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub token_counts: BTreeMap<TokenizerKind, u64>,
    /// Generation error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Generation error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a message with a fresh ID and a single text part.
    #[must_use]
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content_parts: vec![ContentPart::text(text)],
            generating: false,
            is_summary: false,
            files: Vec::new(),
            links: Vec::new(),
            token_counts: BTreeMap::new(),
            error: None,
            error_code: None,
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a system message.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, text)
    }

    /// Create a user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text)
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text)
    }

    /// Replace the ID (builder style).
    #[must_use]
    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }

    /// Mark as still generating (builder style).
    #[must_use]
    pub fn generating(mut self) -> Self {
        self.generating = true;
        self
    }

    /// Record a known token count (builder style).
    #[must_use]
    pub fn with_token_count(mut self, kind: TokenizerKind, count: u64) -> Self {
        let _ = self.token_counts.insert(kind, count);
        self
    }

    /// Append a content part (builder style).
    #[must_use]
    pub fn with_part(mut self, part: ContentPart) -> Self {
        self.content_parts.push(part);
        self
    }

    /// Copy of this message under a new ID.
    #[must_use]
    pub fn with_fresh_id(&self) -> Self {
        let mut copy = self.clone();
        copy.id = MessageId::new();
        copy
    }

    /// Whether this is a system message.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.role == MessageRole::System
    }

    /// Whether this is a user message.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    /// Whether any content part is a tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.content_parts.iter().any(ContentPart::is_tool_call)
    }

    /// Concatenated text of all text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.content_parts
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// Known token count for a tokenizer, if any.
    #[must_use]
    pub fn token_count(&self, kind: TokenizerKind) -> Option<u64> {
        self.token_counts.get(&kind).copied()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_set_role() {
        assert!(Message::system("s").is_system());
        assert!(Message::user("u").is_user());
        assert_eq!(Message::assistant("a").role, MessageRole::Assistant);
    }

    #[test]
    fn text_joins_text_parts_only() {
        let msg = Message::assistant("Hello, ")
            .with_part(ContentPart::Reasoning {
                text: "thinking".into(),
            })
            .with_part(ContentPart::text("world"));
        assert_eq!(msg.text(), "Hello, world");
    }

    #[test]
    fn fresh_id_keeps_content() {
        let msg = Message::user("same");
        let copy = msg.with_fresh_id();
        assert_ne!(copy.id, msg.id);
        assert_eq!(copy.content_parts, msg.content_parts);
    }

    #[test]
    fn token_count_is_per_tokenizer() {
        let msg = Message::user("x").with_token_count(TokenizerKind::Default, 7);
        assert_eq!(msg.token_count(TokenizerKind::Default), Some(7));
        assert_eq!(msg.token_count(TokenizerKind::Deepseek), None);
    }

    #[test]
    fn deserializes_with_missing_optional_fields() {
        let msg: Message = serde_json::from_value(json!({
            "id": "m1",
            "role": "assistant",
            "contentParts": [
                {"type": "text", "text": "hi"},
                {"type": "tool-call", "toolCallId": "c1", "toolName": "search",
                 "args": {"q": "rust"}, "state": "result", "result": {"hits": 3}}
            ],
            "tokenCounts": {"default": 12}
        }))
        .unwrap();
        assert_eq!(msg.id.as_str(), "m1");
        assert!(!msg.generating);
        assert!(!msg.is_summary);
        assert!(msg.has_tool_calls());
        assert_eq!(msg.token_count(TokenizerKind::Default), Some(12));
    }
}
