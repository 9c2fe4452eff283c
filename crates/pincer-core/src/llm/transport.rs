//! Resilient chat transport: orphan filtering, bounded retry with
//! exponential backoff, and one-shot failover to a secondary backend.

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use pincer_types::llm::{ChatRequest, LlmError, LlmResponse};

use super::backend::ChatBackend;
use super::provider::LlmProvider;
use super::retry::{RetryPolicy, classify_response};
use super::sanitize::strip_orphan_tool_messages;
use super::wire::{build_request_body, parse_response};

/// Secondary backend and the model to request from it.
struct Fallback<B> {
    backend: B,
    model: String,
}

/// Sends chat requests to a primary backend, retrying transient failures
/// and failing over to an optional secondary backend.
pub struct Transport<B> {
    primary: B,
    default_model: String,
    fallback: Option<Fallback<B>>,
    policy: RetryPolicy,
}

impl<B: ChatBackend> Transport<B> {
    pub fn new(primary: B, default_model: impl Into<String>) -> Self {
        Self {
            primary,
            default_model: default_model.into(),
            fallback: None,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Configure the backend and model used once the primary is exhausted.
    pub fn with_fallback(mut self, backend: B, model: impl Into<String>) -> Self {
        self.fallback = Some(Fallback {
            backend,
            model: model.into(),
        });
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Send `request`, retrying on the primary and then failing over once.
    ///
    /// Client errors (401/403, other 4xx) return immediately and never fail
    /// over. Cancellation is observed during every send and every backoff.
    pub async fn send(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };

        let err = match self.call_with_retry(&self.primary, model, request, cancel).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        match &self.fallback {
            Some(fallback) if err.is_failover_eligible() => {
                warn!(
                    primary = self.primary.name(),
                    fallback = fallback.backend.name(),
                    fallback_model = %fallback.model,
                    error = %err,
                    "primary backend unavailable, failing over"
                );
                self.call_with_retry(&fallback.backend, &fallback.model, request, cancel)
                    .await
            }
            _ => Err(err),
        }
    }

    async fn call_with_retry(
        &self,
        backend: &B,
        model: &str,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LlmError> {
        let messages = strip_orphan_tool_messages(&request.messages);
        let body = build_request_body(model, &messages, &request.tools, &request.options);

        let span = info_span!(
            "gen_ai.chat",
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = backend.name(),
            gen_ai.request.model = model,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
        );

        self.retry_loop(backend, &body, cancel).instrument(span).await
    }

    async fn retry_loop(
        &self,
        backend: &B,
        body: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LlmError> {
        let mut last_err = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = self.policy.backoff(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying backend call");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                outcome = backend.post_chat(body) => outcome,
            };

            let err = match outcome.and_then(|raw| classify_response(raw.status, raw.body)) {
                Ok(text) => {
                    let response = parse_response(&text)?;
                    if let Some(usage) = response.usage {
                        let span = tracing::Span::current();
                        span.record("gen_ai.usage.input_tokens", usage.prompt_tokens);
                        span.record("gen_ai.usage.output_tokens", usage.completion_tokens);
                    }
                    debug!(attempt, tool_calls = response.tool_calls.len(), "backend call succeeded");
                    return Ok(response);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                debug!(attempt, error = %err, "non-retryable backend error");
                return Err(err);
            }
            warn!(attempt, status = ?err.status(), error = %err, "transient backend error");
            last_err = Some(err);
        }

        Err(LlmError::RetriesExhausted {
            retries: self.policy.max_retries,
            last: Box::new(last_err.unwrap_or(LlmError::NotConfigured)),
        })
    }
}

impl<B: ChatBackend> LlmProvider for Transport<B> {
    fn name(&self) -> &str {
        self.primary.name()
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn chat(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LlmError> {
        self.send(request, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use pincer_types::llm::{Message, RequestOptions, ToolCall};
    use pincer_types::tool::ToolArguments;
    use tokio::time::Instant;

    use super::*;
    use crate::llm::backend::RawResponse;

    const OK_BODY: &str = r#"{"choices":[{"message":{"content":"hello"},"finish_reason":"stop"}]}"#;

    /// Backend replaying a fixed script of outcomes and recording bodies.
    #[derive(Clone)]
    struct ScriptedBackend {
        name: &'static str,
        script: Arc<Mutex<VecDeque<Result<RawResponse, LlmError>>>>,
        calls: Arc<AtomicUsize>,
        bodies: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    impl ScriptedBackend {
        fn new(name: &'static str, script: Vec<Result<RawResponse, LlmError>>) -> Self {
            Self {
                name,
                script: Arc::new(Mutex::new(script.into())),
                calls: Arc::new(AtomicUsize::new(0)),
                bodies: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn status(status: u16, body: &str) -> Result<RawResponse, LlmError> {
            Ok(RawResponse::new(status, body))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_body(&self) -> serde_json::Value {
            self.bodies.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn name(&self) -> &str {
            self.name
        }

        async fn post_chat(&self, body: &serde_json::Value) -> Result<RawResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies.lock().unwrap().push(body.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".into())))
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::new(vec![Message::user("hi")]).with_options(RequestOptions::new(8192, 0.7))
    }

    #[tokio::test(start_paused = true)]
    async fn test_503_then_success_waits_one_backoff() {
        let backend = ScriptedBackend::new(
            "primary",
            vec![
                ScriptedBackend::status(503, "unavailable"),
                ScriptedBackend::status(200, OK_BODY),
            ],
        );
        let transport = Transport::new(backend.clone(), "gpt-4o");

        let start = Instant::now();
        let response = transport.send(&request(), &CancellationToken::new()).await.unwrap();

        assert_eq!(response.content, "hello");
        assert_eq!(backend.calls(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_401_fails_immediately_without_failover() {
        let primary = ScriptedBackend::new("primary", vec![ScriptedBackend::status(401, "invalid key")]);
        let fallback = ScriptedBackend::new("fallback", vec![ScriptedBackend::status(200, OK_BODY)]);
        let transport = Transport::new(primary.clone(), "gpt-4o").with_fallback(fallback.clone(), "glm-4.7");

        let start = Instant::now();
        let err = transport.send(&request(), &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, LlmError::Authentication { status: 401, ref body } if body == "invalid key"));
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_529_exhausted_fails_over_exactly_once() {
        let primary = ScriptedBackend::new(
            "primary",
            (0..4).map(|_| ScriptedBackend::status(529, "overloaded")).collect(),
        );
        let fallback = ScriptedBackend::new("fallback", vec![ScriptedBackend::status(200, OK_BODY)]);
        let transport = Transport::new(primary.clone(), "claude-sonnet-4").with_fallback(fallback.clone(), "glm-4.7");

        let response = transport.send(&request(), &CancellationToken::new()).await.unwrap();

        assert_eq!(response.content, "hello");
        assert_eq!(primary.calls(), 4);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(fallback.last_body()["model"], "glm-4.7");
        assert_eq!(primary.last_body()["model"], "claude-sonnet-4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_has_independent_retry_budget() {
        let primary = ScriptedBackend::new(
            "primary",
            (0..4).map(|_| ScriptedBackend::status(500, "boom")).collect(),
        );
        let fallback = ScriptedBackend::new(
            "fallback",
            vec![
                ScriptedBackend::status(502, "bad gateway"),
                ScriptedBackend::status(200, OK_BODY),
            ],
        );
        let transport = Transport::new(primary.clone(), "m1").with_fallback(fallback.clone(), "m2");

        let start = Instant::now();
        transport.send(&request(), &CancellationToken::new()).await.unwrap();

        assert_eq!(primary.calls(), 4);
        assert_eq!(fallback.calls(), 2);
        // 2 + 4 + 8 on the primary, 2 on the fallback.
        assert_eq!(start.elapsed(), Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_without_fallback() {
        let primary = ScriptedBackend::new(
            "primary",
            (0..4).map(|_| ScriptedBackend::status(529, "overloaded")).collect(),
        );
        let transport = Transport::new(primary.clone(), "m1");

        let start = Instant::now();
        let err = transport.send(&request(), &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, LlmError::RetriesExhausted { retries: 3, .. }));
        assert_eq!(primary.calls(), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_request_returns_body_without_retry() {
        let primary = ScriptedBackend::new("primary", vec![ScriptedBackend::status(400, "messages: invalid")]);
        let fallback = ScriptedBackend::new("fallback", vec![]);
        let transport = Transport::new(primary.clone(), "m1").with_fallback(fallback.clone(), "m2");

        let err = transport.send(&request(), &CancellationToken::new()).await.unwrap_err();

        assert!(err.to_string().contains("messages: invalid"));
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overload_envelope_on_200_is_retried() {
        let primary = ScriptedBackend::new(
            "primary",
            vec![
                ScriptedBackend::status(200, r#"{"error":{"message":"engine_overloaded"}}"#),
                ScriptedBackend::status(200, OK_BODY),
            ],
        );
        let transport = Transport::new(primary.clone(), "m1");

        let response = transport.send(&request(), &CancellationToken::new()).await.unwrap();
        assert_eq!(response.content, "hello");
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_are_retried() {
        let primary = ScriptedBackend::new(
            "primary",
            vec![
                Err(LlmError::Transport("connection refused".into())),
                Err(LlmError::Timeout),
                ScriptedBackend::status(200, OK_BODY),
            ],
        );
        let transport = Transport::new(primary.clone(), "m1");

        transport.send(&request(), &CancellationToken::new()).await.unwrap();
        assert_eq!(primary.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let primary = ScriptedBackend::new(
            "primary",
            (0..4).map(|_| ScriptedBackend::status(503, "down")).collect(),
        );
        let transport = Transport::new(primary.clone(), "m1");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = transport.send(&request(), &cancel).await.unwrap_err();

        assert!(matches!(err, LlmError::Cancelled));
        assert_eq!(primary.calls(), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_already_cancelled_sends_nothing() {
        let primary = ScriptedBackend::new("primary", vec![ScriptedBackend::status(200, OK_BODY)]);
        let transport = Transport::new(primary.clone(), "m1");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = transport.send(&request(), &cancel).await.unwrap_err();
        assert!(matches!(err, LlmError::Cancelled));
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_orphan_tool_messages_stripped_before_send() {
        let primary = ScriptedBackend::new("primary", vec![ScriptedBackend::status(200, OK_BODY)]);
        let transport = Transport::new(primary.clone(), "m1");
        let call = ToolCall {
            id: "c1".into(),
            name: "exec".into(),
            arguments: ToolArguments::new(),
        };
        let request = ChatRequest::new(vec![
            Message::user("hi"),
            Message::tool_result("orphan", "stale"),
            Message::assistant_with_tool_calls("", vec![call]),
            Message::tool_result("c1", "ok"),
        ]);

        transport.send(&request, &CancellationToken::new()).await.unwrap();

        let sent = primary.last_body();
        let messages = sent["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2]["tool_call_id"], "c1");
    }

    #[tokio::test]
    async fn test_request_model_overrides_default() {
        let primary = ScriptedBackend::new("primary", vec![ScriptedBackend::status(200, OK_BODY)]);
        let transport = Transport::new(primary.clone(), "default-model");

        let request = request().with_model("override-model");
        transport.send(&request, &CancellationToken::new()).await.unwrap();
        assert_eq!(primary.last_body()["model"], "override-model");
    }
}
