//! Built-in tools registered by the binary.

use std::sync::Arc;

use serde_json::json;

use pincer_core::agent::subagent::SubagentManager;
use pincer_core::agent::tools::{Tool, ToolContext, ToolError};
use pincer_core::message::bus::MessageBus;
use pincer_types::bus::OutboundMessage;
use pincer_types::tool::{ToolArguments, ToolDefinition};

/// Delegates a task to a background subagent.
pub struct SpawnTool {
    manager: Arc<SubagentManager>,
}

impl SpawnTool {
    pub fn new(manager: Arc<SubagentManager>) -> Self {
        Self { manager }
    }
}

impl Tool for SpawnTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "spawn".to_string(),
            description: "Spawn a subagent to handle a task in the background. Use this for \
                complex or time-consuming tasks that can run independently. The subagent \
                reports back when it finishes."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "task": {"type": "string", "description": "The task for the subagent to complete"},
                    "label": {"type": "string", "description": "Optional short label for the task"}
                },
                "required": ["task"]
            }),
        }
    }

    async fn execute(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<String, ToolError> {
        let task = args
            .get_str("task")
            .ok_or_else(|| ToolError::Execution("task is required".to_string()))?;
        let label = args.get_str("label").map(str::to_string);

        let spawned = self
            .manager
            .spawn(task, label, ctx.channel.clone(), ctx.chat_id.clone());
        Ok(format!(
            "Subagent [{}] started (id: {}). I'll report back when it completes.",
            spawned.label, spawned.id
        ))
    }
}

/// Sends a message to a chat outside the normal reply path.
pub struct MessageTool {
    bus: Arc<MessageBus>,
}

impl MessageTool {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

impl Tool for MessageTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "message".to_string(),
            description: "Send a message to the user. Defaults to the current conversation; \
                set channel and chat_id to reach another one."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string", "description": "The message content"},
                    "channel": {"type": "string", "description": "Target channel (optional)"},
                    "chat_id": {"type": "string", "description": "Target chat ID (optional)"}
                },
                "required": ["content"]
            }),
        }
    }

    async fn execute(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<String, ToolError> {
        let content = args
            .get_str("content")
            .ok_or_else(|| ToolError::Execution("content is required".to_string()))?;
        let channel = args.get_str("channel").unwrap_or(&ctx.channel);
        let chat_id = args.get_str("chat_id").unwrap_or(&ctx.chat_id);

        self.bus
            .publish_outbound(OutboundMessage::new(channel, chat_id, content))
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        Ok(format!("Message sent to {channel}:{chat_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pincer_core::agent::tools::ToolRegistry;
    use pincer_core::llm::box_provider::BoxLlmProvider;
    use pincer_core::llm::provider::LlmProvider;
    use pincer_types::llm::{ChatRequest, LlmError, LlmResponse};
    use tokio_util::sync::CancellationToken;

    struct EchoTask;

    impl LlmProvider for EchoTask {
        fn name(&self) -> &str {
            "echo"
        }

        fn default_model(&self) -> &str {
            "echo-1"
        }

        async fn chat(
            &self,
            request: &ChatRequest,
            _cancel: &CancellationToken,
        ) -> Result<LlmResponse, LlmError> {
            let task = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(LlmResponse::text(format!("done: {task}")))
        }
    }

    fn registry(bus: &Arc<MessageBus>) -> ToolRegistry {
        let manager = Arc::new(SubagentManager::new(
            Arc::new(BoxLlmProvider::new(EchoTask)),
            Arc::clone(bus),
            "",
        ));
        let mut registry = ToolRegistry::new();
        registry.register(SpawnTool::new(manager));
        registry.register(MessageTool::new(Arc::clone(bus)));
        registry
    }

    #[tokio::test]
    async fn test_message_defaults_to_current_chat() {
        let bus = Arc::new(MessageBus::new());
        let result = registry(&bus)
            .execute(
                "message",
                &ToolArguments::new().with("content", "ping"),
                &ToolContext::new("telegram", "42"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result, "Message sent to telegram:42");

        let out = bus.consume_outbound(&CancellationToken::new()).await.unwrap();
        assert_eq!(out.channel, "telegram");
        assert_eq!(out.chat_id, "42");
        assert_eq!(out.content, "ping");
    }

    #[tokio::test]
    async fn test_message_explicit_target() {
        let bus = Arc::new(MessageBus::new());
        registry(&bus)
            .execute(
                "message",
                &ToolArguments::new()
                    .with("content", "hi")
                    .with("channel", "discord")
                    .with("chat_id", "general"),
                &ToolContext::new("cli", "direct"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let out = bus.consume_outbound(&CancellationToken::new()).await.unwrap();
        assert_eq!((out.channel.as_str(), out.chat_id.as_str()), ("discord", "general"));
    }

    #[tokio::test]
    async fn test_spawn_reports_back_to_origin() {
        let bus = Arc::new(MessageBus::new());
        let result = registry(&bus)
            .execute(
                "spawn",
                &ToolArguments::new().with("task", "count the files").with("label", "count"),
                &ToolContext::new("cli", "direct"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.starts_with("Subagent [count] started (id: "));

        let announcement = bus.consume_inbound(&CancellationToken::new()).await.unwrap();
        assert!(announcement.is_system());
        assert_eq!(announcement.chat_id, "cli:direct");
        assert!(announcement.content.contains("done: count the files"));
    }

    #[tokio::test]
    async fn test_spawn_requires_task() {
        let bus = Arc::new(MessageBus::new());
        let err = registry(&bus)
            .execute(
                "spawn",
                &ToolArguments::new(),
                &ToolContext::new("cli", "direct"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
