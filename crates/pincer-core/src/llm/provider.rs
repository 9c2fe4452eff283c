//! LlmProvider trait definition.
//!
//! This is the abstraction the agent loop, the compactor and subagents call.
//! Uses RPITIT; see `BoxLlmProvider` for the dyn-compatible wrapper.

use pincer_types::llm::{ChatRequest, LlmError, LlmResponse};
use tokio_util::sync::CancellationToken;

/// Trait for chat-completion providers.
///
/// The production implementation is [`Transport`](super::transport::Transport);
/// tests substitute scripted providers.
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openrouter", "zhipu").
    fn name(&self) -> &str;

    /// Model used when a request leaves `model` empty.
    fn default_model(&self) -> &str;

    /// Send a chat request and receive the full response.
    ///
    /// Must return [`LlmError::Cancelled`] promptly once `cancel` fires.
    fn chat(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = Result<LlmResponse, LlmError>> + Send;
}
