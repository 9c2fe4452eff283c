//! Configuration loader for Pincer.
//!
//! Reads `config.toml` from the data directory (`~/.pincer/` by default) and
//! deserializes it into [`PincerConfig`]. Falls back to defaults when the
//! file is missing or malformed, then applies `PINCER_*` environment
//! overrides on top.

use std::path::{Path, PathBuf};

use pincer_types::config::PincerConfig;
use thiserror::Error;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "PINCER_DATA_DIR";

const ENV_PREFIX: &str = "PINCER_";

/// Errors from turning configuration into a working setup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no API key configured for model: {0}")]
    MissingApiKey(String),

    #[error("no API base configured for model: {0}")]
    MissingApiBase(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Resolve the data directory.
///
/// Priority:
/// 1. Explicit override (e.g. `--data-dir`)
/// 2. `PINCER_DATA_DIR` environment variable
/// 3. `~/.pincer`
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir;
    }
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".pincer");
    }
    PathBuf::from(".pincer")
}

/// Directory holding the session files.
///
/// `data_dir` from the config file wins over the directory the config
/// was loaded from.
pub fn sessions_dir(config: &PincerConfig, data_dir: &Path) -> PathBuf {
    config
        .data_dir
        .as_deref()
        .unwrap_or(data_dir)
        .join("sessions")
}

/// Load configuration from `{data_dir}/config.toml` plus the environment.
///
/// - Missing file: defaults.
/// - Unreadable or unparseable file: warning, defaults.
/// - `PINCER_*` overrides are applied in every case.
pub async fn load_config(data_dir: &Path) -> PincerConfig {
    let mut config = load_file(data_dir).await;
    apply_env_overrides(&mut config, std::env::vars());
    config
}

async fn load_file(data_dir: &Path) -> PincerConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return PincerConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return PincerConfig::default();
        }
    };

    match toml::from_str::<PincerConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            PincerConfig::default()
        }
    }
}

/// Apply `PINCER_MODEL`, `PINCER_FALLBACK_MODEL` and
/// `PINCER_PROVIDERS_<NAME>_API_KEY` / `_API_BASE` from `vars`.
///
/// Empty values are ignored. Provider names are lowercased.
pub fn apply_env_overrides(
    config: &mut PincerConfig,
    vars: impl IntoIterator<Item = (String, String)>,
) {
    for (name, value) in vars {
        if value.is_empty() {
            continue;
        }
        let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };

        match rest {
            "MODEL" => config.agent.model = value,
            "FALLBACK_MODEL" => config.agent.fallback_model = Some(value),
            _ => {
                let Some(provider_field) = rest.strip_prefix("PROVIDERS_") else {
                    continue;
                };
                if let Some(provider) = provider_field.strip_suffix("_API_KEY") {
                    config
                        .providers
                        .entry(provider.to_lowercase())
                        .or_default()
                        .api_key = value;
                } else if let Some(provider) = provider_field.strip_suffix("_API_BASE") {
                    config
                        .providers
                        .entry(provider.to_lowercase())
                        .or_default()
                        .api_base = Some(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn load_file_missing_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_file(tmp.path()).await;
        assert_eq!(config.agent.model, "glm-4.7");
        assert!(config.providers.is_empty());
    }

    #[tokio::test]
    async fn load_file_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[agent]
model = "gpt-4o"
fallback_model = "gemini-2.5-flash"

[compaction]
keep_last = 6

[providers.openai]
api_key = "sk-openai"
"#,
        )
        .await
        .unwrap();

        let config = load_file(tmp.path()).await;
        assert_eq!(config.agent.model, "gpt-4o");
        assert_eq!(config.agent.fallback_model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(config.compaction.keep_last, 6);
        assert_eq!(config.compaction.threshold, 20);
        assert_eq!(config.provider("openai").unwrap().api_key, "sk-openai");
    }

    #[tokio::test]
    async fn load_file_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "[agent\nmodel = ")
            .await
            .unwrap();

        let config = load_file(tmp.path()).await;
        assert_eq!(config.agent.max_tool_iterations, 20);
    }

    #[test]
    fn env_overrides_model_and_providers() {
        let mut config = PincerConfig::default();
        apply_env_overrides(
            &mut config,
            vars(&[
                ("PINCER_MODEL", "anthropic/claude-sonnet-4"),
                ("PINCER_FALLBACK_MODEL", "gpt-4o-mini"),
                ("PINCER_PROVIDERS_OPENROUTER_API_KEY", "sk-or"),
                ("PINCER_PROVIDERS_VLLM_API_BASE", "http://localhost:8000/v1"),
                ("HOME", "/root"),
            ]),
        );

        assert_eq!(config.agent.model, "anthropic/claude-sonnet-4");
        assert_eq!(config.agent.fallback_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.provider("openrouter").unwrap().api_key, "sk-or");
        assert_eq!(
            config.provider("vllm").unwrap().api_base.as_deref(),
            Some("http://localhost:8000/v1")
        );
        assert_eq!(config.providers.len(), 2);
    }

    #[test]
    fn env_overrides_ignore_empty_and_unknown() {
        let mut config = PincerConfig::default();
        apply_env_overrides(
            &mut config,
            vars(&[("PINCER_MODEL", ""), ("PINCER_PROVIDERS_OPENAI_REGION", "eu")]),
        );
        assert_eq!(config.agent.model, "glm-4.7");
        assert!(config.providers.is_empty());
    }

    #[test]
    fn sessions_dir_prefers_configured_data_dir() {
        let mut config = PincerConfig::default();
        assert_eq!(
            sessions_dir(&config, Path::new("/home/u/.pincer")),
            PathBuf::from("/home/u/.pincer/sessions")
        );
        config.data_dir = Some(PathBuf::from("/srv/pincer"));
        assert_eq!(
            sessions_dir(&config, Path::new("/home/u/.pincer")),
            PathBuf::from("/srv/pincer/sessions")
        );
    }

    #[test]
    fn resolve_data_dir_explicit_wins() {
        let dir = resolve_data_dir(Some(PathBuf::from("/tmp/pincer-test")));
        assert_eq!(dir, PathBuf::from("/tmp/pincer-test"));
    }
}
