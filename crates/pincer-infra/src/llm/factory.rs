//! Provider resolution and transport assembly.
//!
//! The endpoint for a model is chosen from its name: routing prefixes go to
//! OpenRouter, family names (claude, gpt, gemini, glm, ...) go to the matching
//! provider when it has a key, a configured vLLM base catches the rest, and
//! OpenRouter is the last resort. The fallback model is resolved the same way;
//! failover is only wired when it resolves.

use std::time::Duration;

use secrecy::SecretString;
use tracing::{info, warn};

use pincer_core::llm::box_provider::BoxLlmProvider;
use pincer_core::llm::retry::RetryPolicy;
use pincer_core::llm::transport::Transport;
use pincer_types::config::PincerConfig;

use super::reqwest_backend::ReqwestBackend;
use crate::config::ConfigError;

/// Model prefixes that are always routed through OpenRouter.
const OPENROUTER_PREFIXES: [&str; 6] = [
    "openrouter/",
    "anthropic/",
    "openai/",
    "meta-llama/",
    "deepseek/",
    "google/",
];

/// Family routing: provider name and the model-name fragments that select it.
/// A family only matches when that provider has an API key.
const FAMILY_ROUTES: [(&str, &[&str]); 6] = [
    ("anthropic", &["claude"]),
    ("openai", &["gpt"]),
    ("gemini", &["gemini"]),
    ("zhipu", &["glm", "zhipu", "zai"]),
    ("groq", &["groq"]),
    ("moonshot", &["moonshot"]),
];

/// Default API base for a known provider. `vllm` has none.
pub fn default_api_base(provider: &str) -> Option<&'static str> {
    match provider {
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "anthropic" => Some("https://api.anthropic.com/v1"),
        "openai" => Some("https://api.openai.com/v1"),
        "gemini" => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
        "zhipu" => Some("https://open.bigmodel.cn/api/paas/v4"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "moonshot" => Some("https://api.moonshot.ai/v1"),
        _ => None,
    }
}

/// Where requests for a model go.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub provider: String,
    pub api_key: String,
    pub api_base: String,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Pick provider, key and base for `model`.
pub fn resolve_endpoint(config: &PincerConfig, model: &str) -> Result<Endpoint, ConfigError> {
    let lower = model.to_lowercase();
    let has_key = |provider: &str| {
        config
            .provider(provider)
            .is_some_and(|p| !p.api_key.is_empty())
    };

    let provider = if OPENROUTER_PREFIXES.iter().any(|p| model.starts_with(p)) {
        "openrouter"
    } else if let Some(&(name, _)) = FAMILY_ROUTES.iter().find(|&&(name, fragments)| {
        fragments.iter().any(|f| lower.contains(f)) && has_key(name)
    }) {
        name
    } else if config
        .provider("vllm")
        .is_some_and(|p| p.api_base.as_deref().is_some_and(|b| !b.is_empty()))
    {
        "vllm"
    } else if has_key("openrouter") {
        "openrouter"
    } else {
        return Err(ConfigError::MissingApiKey(model.to_string()));
    };

    let settings = config.provider(provider).cloned().unwrap_or_default();
    if settings.api_key.is_empty() && !model.starts_with("bedrock/") && provider != "vllm" {
        return Err(ConfigError::MissingApiKey(model.to_string()));
    }

    let api_base = settings
        .api_base
        .filter(|b| !b.is_empty())
        .or_else(|| default_api_base(provider).map(str::to_string))
        .ok_or_else(|| ConfigError::MissingApiBase(model.to_string()))?;

    Ok(Endpoint {
        provider: provider.to_string(),
        api_key: settings.api_key,
        api_base,
    })
}

fn backend_for(endpoint: Endpoint, timeout: Duration) -> Result<ReqwestBackend, ConfigError> {
    ReqwestBackend::new(
        endpoint.provider,
        SecretString::from(endpoint.api_key),
        endpoint.api_base,
        timeout,
    )
    .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Build the resilient provider for the configured model and fallback.
///
/// # Errors
///
/// Fails when the primary model resolves to no key or base. An unresolvable
/// fallback only disables failover.
pub fn create_provider(config: &PincerConfig) -> Result<BoxLlmProvider, ConfigError> {
    let model = config.agent.model.as_str();
    let timeout = Duration::from_secs(config.transport.request_timeout_secs);

    let primary = resolve_endpoint(config, model)?;
    info!(model, provider = %primary.provider, "resolved LLM provider");

    let mut transport = Transport::new(backend_for(primary, timeout)?, model)
        .with_policy(RetryPolicy::from(&config.transport));

    if let Some(fallback_model) = config.agent.fallback_model.as_deref().filter(|m| !m.is_empty()) {
        match resolve_endpoint(config, fallback_model) {
            Ok(endpoint) => {
                info!(primary = model, fallback = fallback_model, "failover configured");
                transport = transport.with_fallback(backend_for(endpoint, timeout)?, fallback_model);
            }
            Err(err) => {
                warn!(fallback = fallback_model, error = %err, "fallback model unresolved, failover disabled");
            }
        }
    }

    Ok(BoxLlmProvider::new(transport))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pincer_types::config::ProviderConfig;
    use pincer_types::llm::{ChatRequest, Message};
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(key: &str, base: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            api_key: key.to_string(),
            api_base: base.map(str::to_string),
        }
    }

    fn config_with(providers: &[(&str, ProviderConfig)]) -> PincerConfig {
        let mut config = PincerConfig::default();
        for (name, settings) in providers {
            config.providers.insert(name.to_string(), settings.clone());
        }
        config
    }

    #[test]
    fn test_prefixed_models_route_to_openrouter() {
        let config = config_with(&[("openrouter", provider("sk-or", None))]);
        let endpoint = resolve_endpoint(&config, "anthropic/claude-sonnet-4").unwrap();
        assert_eq!(endpoint.provider, "openrouter");
        assert_eq!(endpoint.api_base, "https://openrouter.ai/api/v1");
        assert_eq!(endpoint.api_key, "sk-or");
    }

    #[test]
    fn test_family_requires_key() {
        let config = config_with(&[
            ("zhipu", provider("zk", None)),
            ("openrouter", provider("sk-or", None)),
        ]);
        let endpoint = resolve_endpoint(&config, "glm-4.7").unwrap();
        assert_eq!(endpoint.provider, "zhipu");
        assert_eq!(endpoint.api_base, "https://open.bigmodel.cn/api/paas/v4");

        // No openai key: gpt falls through to OpenRouter.
        let endpoint = resolve_endpoint(&config, "gpt-4o").unwrap();
        assert_eq!(endpoint.provider, "openrouter");
    }

    #[test]
    fn test_configured_base_overrides_default() {
        let config = config_with(&[("openai", provider("sk", Some("http://proxy.local/v1")))]);
        let endpoint = resolve_endpoint(&config, "gpt-4o-mini").unwrap();
        assert_eq!(endpoint.api_base, "http://proxy.local/v1");
    }

    #[test]
    fn test_vllm_needs_only_a_base() {
        let config = config_with(&[("vllm", provider("", Some("http://localhost:8000/v1")))]);
        let endpoint = resolve_endpoint(&config, "qwen2.5-7b").unwrap();
        assert_eq!(endpoint.provider, "vllm");
        assert!(endpoint.api_key.is_empty());
    }

    #[test]
    fn test_unresolvable_model_is_missing_key() {
        let err = resolve_endpoint(&PincerConfig::default(), "glm-4.7").unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey(m) if m == "glm-4.7"));

        let err = resolve_endpoint(&PincerConfig::default(), "openrouter/auto").unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey(_)));
    }

    #[test]
    fn test_endpoint_debug_redacts_key() {
        let config = config_with(&[("openrouter", provider("sk-secret", None))]);
        let endpoint = resolve_endpoint(&config, "deepseek/deepseek-chat").unwrap();
        assert!(!format!("{endpoint:?}").contains("sk-secret"));
    }

    #[test]
    fn test_create_provider_names_primary() {
        let mut config = config_with(&[("moonshot", provider("mk", None))]);
        config.agent.model = "moonshot-v1-8k".to_string();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "moonshot");
        assert_eq!(provider.default_model(), "moonshot-v1-8k");
    }

    #[tokio::test]
    async fn test_failover_to_resolved_fallback() {
        let primary = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(1)
            .mount(&primary)
            .await;

        let fallback = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"choices":[{"message":{"content":"from fallback"},"finish_reason":"stop"}]}"#,
            ))
            .expect(1)
            .mount(&fallback)
            .await;

        let mut config = config_with(&[
            ("openai", provider("sk-openai", Some(&primary.uri()))),
            ("anthropic", provider("sk-ant", Some(&fallback.uri()))),
        ]);
        config.agent.model = "gpt-4o".to_string();
        config.agent.fallback_model = Some("claude-haiku".to_string());
        config.transport.max_retries = 0;

        let provider = create_provider(&config).unwrap();
        let response = provider
            .chat(
                &ChatRequest::new(vec![Message::user("hi")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.content, "from fallback");
    }

    #[tokio::test]
    async fn test_unresolved_fallback_disables_failover() {
        let primary = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(1)
            .mount(&primary)
            .await;

        let mut config = config_with(&[("openai", provider("sk-openai", Some(&primary.uri())))]);
        config.agent.model = "gpt-4o".to_string();
        config.agent.fallback_model = Some("claude-haiku".to_string());
        config.transport.max_retries = 0;

        let provider = create_provider(&config).unwrap();
        let err = provider
            .chat(
                &ChatRequest::new(vec![Message::user("hi")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
    }
}
