//! Configuration types for Pincer.
//!
//! `PincerConfig` represents the `config.toml` in the data directory. Every
//! field has a default, so an empty file (or no file) is a valid config.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PincerConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub compaction: CompactionConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Provider credentials keyed by provider name (e.g. "openrouter").
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Overrides the default data directory (`~/.pincer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl PincerConfig {
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Secondary model used when the primary backend is unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum request/tool round trips per turn.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    /// Model context window in tokens.
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Extra text appended to the system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_model() -> String {
    "glm-4.7".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tool_iterations() -> usize {
    20
}

fn default_context_window() -> usize {
    128_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            fallback_model: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_tool_iterations: default_max_tool_iterations(),
            context_window: default_context_window(),
            system_prompt: None,
        }
    }
}

/// History compaction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Compact once history holds more than this many messages.
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// Messages kept verbatim at the tail of history.
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,

    /// Summarize in two halves when more messages than this remain.
    #[serde(default = "default_split_threshold")]
    pub split_threshold: usize,

    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,

    #[serde(default = "default_summary_temperature")]
    pub summary_temperature: f64,

    #[serde(default = "default_compaction_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_threshold() -> usize {
    20
}

fn default_keep_last() -> usize {
    4
}

fn default_split_threshold() -> usize {
    10
}

fn default_summary_max_tokens() -> u32 {
    1024
}

fn default_summary_temperature() -> f64 {
    0.3
}

fn default_compaction_timeout_secs() -> u64 {
    120
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            keep_last: default_keep_last(),
            split_threshold: default_split_threshold(),
            summary_max_tokens: default_summary_max_tokens(),
            summary_temperature: default_summary_temperature(),
            timeout_secs: default_compaction_timeout_secs(),
        }
    }
}

/// Backend retry and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles on every retry.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Credentials and endpoint for one provider.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() || self.api_base.is_some()
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.api_key.is_empty() { "" } else { "[REDACTED]" };
        f.debug_struct("ProviderConfig")
            .field("api_key", &key)
            .field("api_base", &self.api_base)
            .finish()
    }
}
