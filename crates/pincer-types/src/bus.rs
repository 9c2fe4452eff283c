//! Message bus envelopes.
//!
//! Chat adapters publish [`InboundMessage`]s and consume
//! [`OutboundMessage`]s. Background tasks report back through the
//! [`SYSTEM_CHANNEL`], encoding the originating conversation in `chat_id`.

use serde::{Deserialize, Serialize};

/// Channel used by background tasks to report into another session.
pub const SYSTEM_CHANNEL: &str = "system";

/// Channel assumed when a system-origin chat id carries no channel prefix.
pub const DEFAULT_ORIGIN_CHANNEL: &str = "cli";

/// A message arriving from a chat channel or a background task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<String>,
    /// Explicit session key; derived from channel and chat id when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            media: Vec::new(),
            session_key: None,
        }
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    pub fn session_key(&self) -> String {
        match &self.session_key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => format!("{}:{}", self.channel, self.chat_id),
        }
    }

    pub fn is_system(&self) -> bool {
        self.channel == SYSTEM_CHANNEL
    }

    /// Originating `(channel, chat_id)` encoded in a system-origin chat id.
    pub fn origin(&self) -> (String, String) {
        split_origin(&self.chat_id)
    }
}

/// Split `origin-channel:origin-chat-id` at the first colon.
///
/// A chat id without a channel prefix belongs to [`DEFAULT_ORIGIN_CHANNEL`].
pub fn split_origin(chat_id: &str) -> (String, String) {
    match chat_id.find(':') {
        Some(idx) if idx > 0 => (chat_id[..idx].to_string(), chat_id[idx + 1..].to_string()),
        _ => (DEFAULT_ORIGIN_CHANNEL.to_string(), chat_id.to_string()),
    }
}

/// A reply to deliver on a chat channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
}

impl OutboundMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_derived_from_channel_and_chat() {
        let msg = InboundMessage::new("telegram", "u1", "42", "hi");
        assert_eq!(msg.session_key(), "telegram:42");
    }

    #[test]
    fn test_explicit_session_key_wins() {
        let msg = InboundMessage::new("cli", "user", "direct", "hi").with_session_key("custom");
        assert_eq!(msg.session_key(), "custom");
    }

    #[test]
    fn test_split_origin() {
        assert_eq!(
            split_origin("discord:123:456"),
            ("discord".to_string(), "123:456".to_string())
        );
        assert_eq!(split_origin("direct"), ("cli".to_string(), "direct".to_string()));
        assert_eq!(split_origin(":oops"), ("cli".to_string(), ":oops".to_string()));
    }

    #[test]
    fn test_system_message_origin() {
        let msg = InboundMessage::new(SYSTEM_CHANNEL, "subagent:ab12", "feishu:oc_9", "done");
        assert!(msg.is_system());
        assert_eq!(msg.origin(), ("feishu".to_string(), "oc_9".to_string()));
    }
}
