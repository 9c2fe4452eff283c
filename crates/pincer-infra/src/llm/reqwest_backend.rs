//! ReqwestBackend -- concrete [`ChatBackend`] for OpenAI-compatible
//! chat-completion endpoints.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is only exposed
//! when building the `Authorization` header. It never appears in `Debug`
//! output or tracing logs.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use pincer_core::llm::backend::{ChatBackend, RawResponse};
use pincer_types::llm::LlmError;

/// HTTP backend for one `{base}/chat/completions` endpoint.
pub struct ReqwestBackend {
    client: reqwest::Client,
    name: String,
    api_key: SecretString,
    base_url: String,
}

impl ReqwestBackend {
    /// Create a backend for `base_url` with a per-request `timeout`.
    ///
    /// A trailing slash on `base_url` is ignored.
    pub fn new(
        name: impl Into<String>,
        api_key: SecretString,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to create HTTP client: {e}")))?;

        let base_url: String = base_url.into();
        Ok(Self {
            client,
            name: name.into(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl std::fmt::Debug for ReqwestBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestBackend")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ChatBackend for ReqwestBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn post_chat(&self, body: &serde_json::Value) -> Result<RawResponse, LlmError> {
        let mut request = self.client.post(self.endpoint()).json(body);
        let key = self.api_key.expose_secret();
        if !key.is_empty() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(map_reqwest_error)?;
        debug!(backend = %self.name, status, bytes = text.len(), "backend responded");

        Ok(RawResponse::new(status, text))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport(err.to_string())
    }
}
