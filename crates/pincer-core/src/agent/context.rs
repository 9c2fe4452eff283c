//! Prompt context assembly.
//!
//! The loop asks a [`ContextBuilder`] for the full message list of each turn.
//! [`PromptContextBuilder`] is the default: a system prompt with XML-tagged
//! sections, then the stored history, then the current user message.

use chrono::Local;
use pincer_types::llm::Message;

/// Produces the message list sent to the backend for one turn.
pub trait ContextBuilder: Send + Sync {
    fn build_messages(
        &self,
        history: &[Message],
        summary: &str,
        current_message: &str,
        media: &[String],
        channel: &str,
        chat_id: &str,
    ) -> Vec<Message>;
}

const DEFAULT_IDENTITY: &str = "You are pincer, a personal assistant agent. You can call tools to \
read and write files, run commands and delegate long tasks to background subagents. Prefer \
acting over asking; report results concisely.";

/// Builds the system prompt from an identity, optional bootstrap text and
/// per-turn session details.
///
/// Layout:
/// ```text
/// <identity>{identity}</identity>
/// <bootstrap>{bootstrap}</bootstrap>
/// <current_session>Channel: ... Chat ID: ... Time: ...</current_session>
/// <conversation_summary>{summary}</conversation_summary>
/// ```
#[derive(Debug, Clone)]
pub struct PromptContextBuilder {
    identity: String,
    bootstrap: Option<String>,
}

impl PromptContextBuilder {
    pub fn new() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            bootstrap: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Extra standing instructions (e.g. the contents of AGENTS.md).
    pub fn with_bootstrap(mut self, bootstrap: impl Into<String>) -> Self {
        let bootstrap = bootstrap.into();
        self.bootstrap = (!bootstrap.trim().is_empty()).then_some(bootstrap);
        self
    }

    pub fn system_prompt(&self, summary: &str, channel: &str, chat_id: &str) -> String {
        let mut sections = Vec::with_capacity(4);

        sections.push(format!("<identity>\n{}\n</identity>", self.identity.trim()));

        if let Some(bootstrap) = &self.bootstrap {
            sections.push(format!("<bootstrap>\n{}\n</bootstrap>", bootstrap.trim()));
        }

        sections.push(format!(
            "<current_session>\nChannel: {channel}\nChat ID: {chat_id}\nTime: {}\n</current_session>",
            Local::now().format("%Y-%m-%d %H:%M (%A)")
        ));

        if !summary.trim().is_empty() {
            sections.push(format!(
                "<conversation_summary>\n{}\n</conversation_summary>",
                summary.trim()
            ));
        }

        sections.join("\n\n")
    }
}

impl Default for PromptContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder for PromptContextBuilder {
    fn build_messages(
        &self,
        history: &[Message],
        summary: &str,
        current_message: &str,
        media: &[String],
        channel: &str,
        chat_id: &str,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.system_prompt(summary, channel, chat_id)));
        messages.extend_from_slice(history);

        let mut content = current_message.to_string();
        if !media.is_empty() {
            content.push_str("\n\nAttached media:");
            for path in media {
                content.push_str(&format!("\n- {path}"));
            }
        }
        messages.push(Message::user(content));
        messages
    }
}
