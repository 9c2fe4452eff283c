//! ChatBackend trait: one HTTP attempt against one chat-completion endpoint.
//!
//! Backends only move bytes. Status classification, retry and failover
//! live in [`Transport`](super::transport::Transport).

use pincer_types::llm::LlmError;

/// Raw HTTP outcome of a single chat-completion POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single chat-completion endpoint.
///
/// Implementations live in pincer-infra (e.g., `ReqwestBackend`).
pub trait ChatBackend: Send + Sync {
    /// Provider name used in logs and spans.
    fn name(&self) -> &str;

    /// POST `body` to `{base}/chat/completions`.
    ///
    /// Any HTTP status is `Ok`; only connection-level failures are errors
    /// ([`LlmError::Transport`] or [`LlmError::Timeout`]).
    fn post_chat(
        &self,
        body: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<RawResponse, LlmError>> + Send;
}
