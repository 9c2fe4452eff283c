//! The agent loop: one inbound message in, one reply out.
//!
//! Each turn runs `BUILD_CONTEXT -> REQUEST -> (TOOL_EXECUTE -> REQUEST)* -> DONE`:
//! the context builder assembles the prompt, the provider is asked for a
//! completion, requested tools run strictly in order with their results fed
//! back, and the exchange is recorded in the session store before a
//! background compaction is considered.

use std::sync::Arc;

use pincer_types::bus::{InboundMessage, OutboundMessage};
use pincer_types::config::AgentConfig;
use pincer_types::llm::{ChatRequest, LlmError, Message, RequestOptions, Role};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::context::ContextBuilder;
use super::tools::{ToolContext, ToolRegistry};
use crate::compaction::compactor::Compactor;
use crate::llm::box_provider::BoxLlmProvider;
use crate::message::bus::MessageBus;
use crate::session::store::SessionStore;

/// Reply used when a user turn ends without any content.
pub const EMPTY_RESPONSE_FILLER: &str = "I've completed processing but have no response to give.";

/// Reply used when a background-task report ends without any content.
pub const BACKGROUND_TASK_FILLER: &str = "Background task completed.";

/// Errors that end a turn without an answer.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(LlmError),

    #[error("turn cancelled")]
    Cancelled,
}

impl From<LlmError> for AgentError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Cancelled => AgentError::Cancelled,
            other => AgentError::Llm(other),
        }
    }
}

/// Per-turn request settings.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Empty means the provider's default model.
    pub model: String,
    pub max_iterations: usize,
    pub options: RequestOptions,
}

impl LoopSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_iterations: config.max_tool_iterations,
            options: RequestOptions::new(config.max_tokens, config.temperature),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Drives turns against the provider, tools and session store.
pub struct AgentLoop {
    provider: Arc<BoxLlmProvider>,
    store: Arc<SessionStore>,
    compactor: Arc<Compactor>,
    context: Arc<dyn ContextBuilder>,
    tools: Arc<ToolRegistry>,
    settings: LoopSettings,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<BoxLlmProvider>,
        store: Arc<SessionStore>,
        compactor: Arc<Compactor>,
        context: Arc<dyn ContextBuilder>,
        tools: Arc<ToolRegistry>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            provider,
            store,
            compactor,
            context,
            tools,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn compactor(&self) -> &Arc<Compactor> {
        &self.compactor
    }

    /// Names of the registered tools, for startup reporting.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.names()
    }

    /// Consume inbound messages until `cancel` fires, publishing one reply
    /// per message. Turn errors become an error reply, never a crash.
    pub async fn run(&self, bus: &MessageBus, cancel: &CancellationToken) {
        info!(
            provider = self.provider.name(),
            tools = ?self.tool_names(),
            tool_count = self.tools.len(),
            "agent loop started"
        );

        while let Some(msg) = bus.consume_inbound(cancel).await {
            let reply = match self.process_message(&msg, cancel).await {
                Ok(reply) => reply,
                Err(AgentError::Cancelled) => break,
                Err(err) => {
                    error!(channel = %msg.channel, chat_id = %msg.chat_id, error = %err, "error processing message");
                    let (channel, chat_id) = reply_target(&msg);
                    OutboundMessage::new(channel, chat_id, format!("Error processing message: {err}"))
                }
            };
            if let Err(err) = bus.publish_outbound(reply).await {
                warn!(error = %err, "failed to publish reply");
            }
        }

        info!("agent loop stopped");
    }

    /// Run one turn for `msg` and return the reply to deliver.
    pub async fn process_message(
        &self,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<OutboundMessage, AgentError> {
        if msg.is_system() {
            return self.process_system_message(msg, cancel).await;
        }

        let session_key = msg.session_key();
        let span = info_span!("agent.turn", session_key = %session_key, channel = %msg.channel);
        self.run_user_turn(msg, &session_key, cancel)
            .instrument(span)
            .await
    }

    async fn run_user_turn(
        &self,
        msg: &InboundMessage,
        session_key: &str,
        cancel: &CancellationToken,
    ) -> Result<OutboundMessage, AgentError> {
        info!(sender = %msg.sender_id, "processing message");

        let history = self.store.history(session_key);
        let summary = self.store.summary(session_key);
        let messages = self.context.build_messages(
            &history,
            &summary,
            &msg.content,
            &msg.media,
            &msg.channel,
            &msg.chat_id,
        );

        let ctx = ToolContext::new(&msg.channel, &msg.chat_id);
        let mut answer = self.run_iterations(messages, &ctx, cancel).await?;
        if answer.is_empty() {
            answer = EMPTY_RESPONSE_FILLER.to_string();
        }

        self.record_turn(session_key, msg.content.clone(), answer.clone())
            .await;
        Ok(OutboundMessage::new(&msg.channel, &msg.chat_id, answer))
    }

    /// Background-task reports arrive on the system channel with the
    /// originating `channel:chat_id` in `chat_id`; the turn runs in, and the
    /// reply goes to, that origin session.
    async fn process_system_message(
        &self,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<OutboundMessage, AgentError> {
        let (origin_channel, origin_chat_id) = msg.origin();
        let session_key = format!("{origin_channel}:{origin_chat_id}");
        let span = info_span!("agent.system_turn", session_key = %session_key, sender = %msg.sender_id);
        async {
            info!("processing system message");

            let history = self.store.history(&session_key);
            let summary = self.store.summary(&session_key);
            let messages = self.context.build_messages(
                &history,
                &summary,
                &msg.content,
                &[],
                &origin_channel,
                &origin_chat_id,
            );

            let ctx = ToolContext::new(&origin_channel, &origin_chat_id);
            let answer = match self.run_iterations(messages, &ctx, cancel).await {
                Ok(answer) if answer.is_empty() => BACKGROUND_TASK_FILLER.to_string(),
                Ok(answer) => answer,
                Err(err) => return Err(err),
            };

            let user_text = format!("[System: {}] {}", msg.sender_id, msg.content);
            self.record_turn(&session_key, user_text, answer.clone()).await;
            Ok(OutboundMessage::new(origin_channel.as_str(), origin_chat_id.as_str(), answer))
        }
        .instrument(span)
        .await
    }

    /// Process `content` outside any chat channel, e.g. from the CLI.
    pub async fn process_direct(
        &self,
        content: &str,
        session_key: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let msg = InboundMessage::new("cli", "user", "direct", content).with_session_key(session_key);
        let reply = self.process_message(&msg, cancel).await?;
        Ok(reply.content)
    }

    /// REQUEST / TOOL_EXECUTE iterations. Returns the final content, or an
    /// empty string when the iteration cap is hit.
    async fn run_iterations(
        &self,
        messages: Vec<Message>,
        ctx: &ToolContext,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let mut request = ChatRequest::new(messages)
            .with_tools(self.tools.definitions())
            .with_model(self.settings.model.clone())
            .with_options(self.settings.options);

        for iteration in 1..=self.settings.max_iterations {
            debug!(iteration, messages = request.messages.len(), "requesting completion");
            let response = self.provider.chat(&request, cancel).await?;

            if !response.has_tool_calls() {
                debug!(iteration, finish_reason = %response.finish_reason, "turn complete");
                return Ok(response.content);
            }

            request.messages.push(Message::assistant_with_tool_calls(
                response.content,
                response.tool_calls.clone(),
            ));

            for call in response.tool_calls {
                let result = match self
                    .tools
                    .execute(&call.name, &call.arguments, ctx, cancel)
                    .await
                {
                    Ok(output) => output,
                    Err(err) => format!("Error: {err}"),
                };
                if cancel.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                request.messages.push(Message::tool_result(call.id, result));
            }
        }

        warn!(
            max_iterations = self.settings.max_iterations,
            "tool iteration cap reached"
        );
        Ok(String::new())
    }

    /// Append the exchange, persist it, then consider compaction.
    async fn record_turn(&self, session_key: &str, user: String, assistant: String) {
        self.store.append(session_key, Role::User, user);
        self.store.append(session_key, Role::Assistant, assistant);

        if let Err(err) = self.store.persist(session_key).await {
            warn!(session_key = %session_key, error = %err, "failed to persist session");
        }

        if self.compactor.maybe_compact(session_key).is_some() {
            debug!(session_key = %session_key, "compaction started");
        }
    }
}

/// Where the reply to `msg` should go.
fn reply_target(msg: &InboundMessage) -> (String, String) {
    if msg.is_system() {
        msg.origin()
    } else {
        (msg.channel.clone(), msg.chat_id.clone())
    }
}
