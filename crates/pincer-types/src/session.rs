//! Conversation session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::Message;

/// One conversation thread: ordered history plus a rolling summary of the
/// turns that were compacted away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque key, typically `channel:chat_id`.
    pub key: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            summary: String::new(),
            created: now,
            updated: now,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated = Utc::now();
    }
}

/// Lightweight listing entry for a stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub key: String,
    pub message_count: usize,
    pub has_summary: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            key: session.key.clone(),
            message_count: session.messages.len(),
            has_summary: !session.summary.is_empty(),
            created: session.created,
            updated: session.updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new("cli:direct");
        assert_eq!(session.key, "cli:direct");
        assert!(session.messages.is_empty());
        assert!(session.summary.is_empty());
        assert_eq!(session.created, session.updated);
    }

    #[test]
    fn test_push_updates_timestamp() {
        let mut session = Session::new("k");
        let before = session.updated;
        session.push(Message::user("hello"));
        assert_eq!(session.messages.len(), 1);
        assert!(session.updated >= before);
    }

    #[test]
    fn test_deserialize_without_summary() {
        let json = r#"{
            "key": "telegram:42",
            "messages": [{"role": "user", "content": "hi"}],
            "created": "2025-01-01T00:00:00Z",
            "updated": "2025-01-01T00:00:05Z"
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.messages.len(), 1);
        assert!(session.summary.is_empty());
        assert!(SessionInfo::from(&session).message_count == 1);
    }
}
