//! Pre-send message filtering.

use std::collections::HashSet;

use pincer_types::llm::{Message, Role};
use tracing::warn;

/// Drop `tool` messages whose `tool_call_id` was not issued by an earlier
/// assistant message in the same sequence.
///
/// Backends reject such sequences outright, so they are stripped rather
/// than failing the call. Every stripped id is logged.
pub fn strip_orphan_tool_messages(messages: &[Message]) -> Vec<Message> {
    let mut issued: HashSet<&str> = HashSet::new();
    let mut kept = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            Role::Assistant => {
                issued.extend(message.tool_calls.iter().map(|call| call.id.as_str()));
                kept.push(message.clone());
            }
            Role::Tool => {
                let id = message.tool_call_id.as_deref().unwrap_or_default();
                if issued.contains(id) {
                    kept.push(message.clone());
                } else {
                    warn!(tool_call_id = %id, "stripping orphaned tool message");
                }
            }
            Role::System | Role::User => kept.push(message.clone()),
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use pincer_types::llm::ToolCall;
    use pincer_types::tool::ToolArguments;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "exec".to_string(),
            arguments: ToolArguments::new().with("command", "ls"),
        }
    }

    #[test]
    fn test_matched_tool_results_are_kept() {
        let messages = vec![
            Message::system("sys"),
            Message::user("list files"),
            Message::assistant_with_tool_calls("", vec![call("a"), call("b")]),
            Message::tool_result("a", "file1"),
            Message::tool_result("b", "file2"),
            Message::assistant("done"),
        ];
        assert_eq!(strip_orphan_tool_messages(&messages), messages);
    }

    #[test]
    fn test_orphan_is_dropped() {
        let messages = vec![
            Message::user("hi"),
            Message::tool_result("ghost", "stale output"),
            Message::assistant_with_tool_calls("", vec![call("a")]),
            Message::tool_result("a", "ok"),
        ];
        let kept = strip_orphan_tool_messages(&messages);
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|m| m.tool_call_id.as_deref() != Some("ghost")));
        assert_eq!(kept[1].tool_calls.len(), 1);
        assert_eq!(kept[2].tool_call_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_result_before_its_call_is_orphaned() {
        let messages = vec![
            Message::tool_result("a", "too early"),
            Message::assistant_with_tool_calls("", vec![call("a")]),
        ];
        let kept = strip_orphan_tool_messages(&messages);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].role, Role::Assistant);
    }

    #[test]
    fn test_tool_message_without_id_is_dropped() {
        let mut msg = Message::tool_result("x", "no id");
        msg.tool_call_id = None;
        assert!(strip_orphan_tool_messages(&[msg]).is_empty());
    }
}
