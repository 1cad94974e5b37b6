//! Collapse old tool-call rounds.
//!
//! A round is one assistant message carrying tool calls. The newest
//! `keep_rounds` rounds keep their tool calls verbatim; in older rounds the
//! tool-call parts are replaced by one short marker naming the tools used.
//! No message is ever removed.

use strand_core::{ContentPart, Message, MessageRole};

use crate::constants::TOOL_CALLS_COLLAPSED_PREFIX;

/// Collapse tool calls older than the newest `keep_rounds` rounds.
pub fn clean_tool_calls(messages: Vec<Message>, keep_rounds: usize) -> Vec<Message> {
    let rounds: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == MessageRole::Assistant && m.has_tool_calls())
        .map(|(i, _)| i)
        .collect();
    let cutoff = rounds
        .len()
        .checked_sub(keep_rounds)
        .and_then(|n| n.checked_sub(1))
        .map(|last_collapsed| rounds[last_collapsed]);

    messages
        .into_iter()
        .enumerate()
        .map(|(i, message)| match cutoff {
            Some(cut) if i <= cut && message.role == MessageRole::Assistant => {
                collapse(message)
            }
            _ => message,
        })
        .collect()
}

fn collapse(mut message: Message) -> Message {
    if !message.has_tool_calls() {
        return message;
    }
    let mut names: Vec<String> = Vec::new();
    message.content_parts.retain(|part| match part {
        ContentPart::ToolCall { tool_name, .. } => {
            if !names.contains(tool_name) {
                names.push(tool_name.clone());
            }
            false
        }
        _ => true,
    });
    message.content_parts.push(ContentPart::text(format!(
        "{TOOL_CALLS_COLLAPSED_PREFIX} {}]",
        names.join(", ")
    )));
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_core::ToolCallState;

    fn tool_round(id: &str, tool: &str) -> Message {
        Message::assistant(format!("calling {tool}"))
            .with_id(id)
            .with_part(ContentPart::ToolCall {
                tool_call_id: format!("call-{id}"),
                tool_name: tool.into(),
                args: json!({}),
                result: Some(json!("ok")),
                state: ToolCallState::Result,
            })
    }

    #[test]
    fn keeps_everything_within_budget() {
        let messages = vec![
            Message::user("q"),
            tool_round("a1", "search"),
            tool_round("a2", "read"),
        ];
        let cleaned = clean_tool_calls(messages.clone(), 2);
        assert_eq!(cleaned, messages);
    }

    #[test]
    fn collapses_older_rounds() {
        let messages = vec![
            Message::user("q"),
            tool_round("a1", "search"),
            Message::user("more"),
            tool_round("a2", "read"),
            tool_round("a3", "write"),
        ];
        let cleaned = clean_tool_calls(messages, 2);

        assert_eq!(cleaned.len(), 5);
        assert!(!cleaned[1].has_tool_calls());
        assert!(cleaned[1].text().contains("[tool calls omitted: search]"));
        assert!(cleaned[3].has_tool_calls());
        assert!(cleaned[4].has_tool_calls());
    }

    #[test]
    fn zero_rounds_collapses_all() {
        let messages = vec![tool_round("a1", "search"), tool_round("a2", "search")];
        let cleaned = clean_tool_calls(messages, 0);
        assert!(cleaned.iter().all(|m| !m.has_tool_calls()));
    }

    #[test]
    fn plain_messages_untouched() {
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        assert_eq!(clean_tool_calls(messages.clone(), 0), messages);
    }

    #[test]
    fn messages_without_parts_are_kept() {
        let mut empty = Message::assistant("");
        empty.content_parts.clear();
        let cleaned = clean_tool_calls(vec![Message::user("q"), empty.clone()], 0);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[1], empty);
    }
}
