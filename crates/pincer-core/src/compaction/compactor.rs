//! History compactor.
//!
//! When a session grows past the threshold, everything but the most recent
//! messages is folded into the session summary by the LLM and removed from
//! history. Runs as a detached task, at most one per session key.

use std::sync::Arc;
use std::time::Duration;

use pincer_types::config::CompactionConfig;
use pincer_types::llm::{ChatRequest, LlmError, Message, RequestOptions, Role};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::lease::CompactionLeases;
use crate::llm::box_provider::BoxLlmProvider;
use crate::session::store::SessionStore;

const OMITTED_NOTE: &str =
    "\n[Note: Some oversized messages were omitted from this summary for efficiency.]";

/// Errors that abandon a compaction attempt. Never surfaced to the user.
#[derive(Debug, thiserror::Error)]
pub enum CompactionError {
    #[error("summarization failed: {0}")]
    Llm(#[from] LlmError),

    #[error("compaction timed out after {0:?}")]
    TimedOut(Duration),
}

/// What a compaction run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Nothing older than the kept tail.
    Skipped,
    Compacted {
        /// Messages removed from history.
        removed: usize,
        /// Messages fed to the summarizer.
        summarized: usize,
        /// Messages excluded by the size guard.
        omitted: usize,
    },
}

/// Tuning for [`Compactor`].
#[derive(Debug, Clone)]
pub struct CompactionSettings {
    pub threshold: usize,
    pub keep_last: usize,
    pub split_threshold: usize,
    pub summary_options: RequestOptions,
    pub timeout: Duration,
    /// Model context window in tokens; a message over half of it is omitted.
    pub context_window: usize,
    /// Empty means the provider's default model.
    pub model: String,
}

impl CompactionSettings {
    pub fn new(config: &CompactionConfig, model: impl Into<String>, context_window: usize) -> Self {
        Self {
            threshold: config.threshold,
            keep_last: config.keep_last,
            split_threshold: config.split_threshold,
            summary_options: RequestOptions::new(
                config.summary_max_tokens,
                config.summary_temperature,
            ),
            timeout: Duration::from_secs(config.timeout_secs),
            context_window,
            model: model.into(),
        }
    }
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self::new(&CompactionConfig::default(), String::new(), 128_000)
    }
}

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Summarizes and truncates session history in the background.
pub struct Compactor {
    store: Arc<SessionStore>,
    provider: Arc<BoxLlmProvider>,
    leases: CompactionLeases,
    settings: CompactionSettings,
    shutdown: CancellationToken,
    idle: Notify,
}

impl Compactor {
    pub fn new(
        store: Arc<SessionStore>,
        provider: Arc<BoxLlmProvider>,
        settings: CompactionSettings,
    ) -> Self {
        Self {
            store,
            provider,
            leases: CompactionLeases::new(),
            settings,
            shutdown: CancellationToken::new(),
            idle: Notify::new(),
        }
    }

    /// Cancel in-flight compactions when `token` fires.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn settings(&self) -> &CompactionSettings {
        &self.settings
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.leases.is_held(key)
    }

    pub fn needs_compaction(&self, key: &str) -> bool {
        self.store.len(key) > self.settings.threshold
    }

    /// Start a background compaction of `key` if its history is over the
    /// threshold and no compaction of it is already running.
    ///
    /// Returns the task handle when one was started. Callers normally drop
    /// it; the lease is released when the task finishes either way.
    pub fn maybe_compact(self: &Arc<Self>, key: &str) -> Option<JoinHandle<()>> {
        if !self.needs_compaction(key) {
            return None;
        }
        let Some(lease) = self.leases.try_acquire(key) else {
            debug!(session_key = %key, "compaction already in progress, skipping");
            return None;
        };

        let this = Arc::clone(self);
        let key = key.to_string();
        let span = info_span!("compaction", session_key = %key);

        Some(tokio::spawn(
            async move {
                let cancel = this.shutdown.child_token();
                let timeout = this.settings.timeout;
                match tokio::time::timeout(timeout, this.compact(&key, &cancel)).await {
                    Ok(Ok(outcome)) => info!(?outcome, "compaction finished"),
                    Ok(Err(err)) => warn!(error = %err, "compaction abandoned"),
                    Err(_) => {
                        cancel.cancel();
                        warn!(error = %CompactionError::TimedOut(timeout), "compaction abandoned");
                    }
                }
                drop(lease);
                this.idle.notify_waiters();
            }
            .instrument(span),
        ))
    }

    /// Wait until no compaction is running. Each run is bounded by the
    /// configured timeout, so this returns in bounded time.
    pub async fn wait_idle(&self) {
        loop {
            let mut finished = std::pin::pin!(self.idle.notified());
            finished.as_mut().enable();
            if self.leases.is_empty() {
                return;
            }
            finished.await;
        }
    }

    /// Run one compaction of `key` in the current task.
    ///
    /// On error, history and summary are left exactly as they were.
    pub async fn compact(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<CompactionOutcome, CompactionError> {
        let history = self.store.history(key);
        if history.len() <= self.settings.keep_last {
            return Ok(CompactionOutcome::Skipped);
        }
        let removed = history.len() - self.settings.keep_last;

        let token_limit = self.settings.context_window / 2;
        let mut omitted = 0;
        let mut valid: Vec<&Message> = Vec::new();
        for message in &history[..removed] {
            if !matches!(message.role, Role::User | Role::Assistant) {
                continue;
            }
            if estimate_tokens(&message.content) > token_limit {
                omitted += 1;
                continue;
            }
            valid.push(message);
        }

        let existing = self.store.summary(key);
        let mut summary = if valid.is_empty() {
            existing
        } else if valid.len() > self.settings.split_threshold {
            let mid = valid.len() / 2;
            let first = self.summarize(&valid[..mid], &existing, cancel).await?;
            let second = self.summarize(&valid[mid..], "", cancel).await?;
            self.merge(first, second, cancel).await?
        } else {
            self.summarize(&valid, &existing, cancel).await?
        };

        if omitted > 0 {
            summary.push_str(OMITTED_NOTE);
        }

        self.store.compact_prefix(key, removed, summary);
        if let Err(err) = self.store.persist(key).await {
            warn!(session_key = %key, error = %err, "failed to persist compacted session");
        }

        Ok(CompactionOutcome::Compacted {
            removed,
            summarized: valid.len(),
            omitted,
        })
    }

    async fn summarize(
        &self,
        messages: &[&Message],
        existing: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let mut prompt = String::from(
            "Provide a concise summary of this conversation segment, preserving core context and key points.\n",
        );
        if !existing.is_empty() {
            prompt.push_str(&format!("Existing context: {existing}\n"));
        }
        prompt.push_str("\nCONVERSATION:\n");
        for message in messages {
            prompt.push_str(&format!("{}: {}\n", message.role, message.content));
        }

        debug!(message_count = messages.len(), "summarizing batch");
        self.ask(prompt, cancel).await
    }

    async fn merge(
        &self,
        first: String,
        second: String,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let prompt = format!(
            "Merge these two conversation summaries into one cohesive summary:\n\n1: {first}\n\n2: {second}"
        );
        match self.ask(prompt, cancel).await {
            Ok(merged) => Ok(merged),
            Err(LlmError::Cancelled) => Err(LlmError::Cancelled),
            Err(err) => {
                warn!(error = %err, "summary merge failed, concatenating partial summaries");
                Ok(format!("{first} {second}"))
            }
        }
    }

    async fn ask(&self, prompt: String, cancel: &CancellationToken) -> Result<String, LlmError> {
        let request = ChatRequest::new(vec![Message::user(prompt)])
            .with_model(self.settings.model.clone())
            .with_options(self.settings.summary_options);
        let response = self.provider.chat(&request, cancel).await?;
        Ok(response.content.trim().to_string())
    }
}
