//! Application state wiring the engine to its adapters.
//!
//! [`AppState`] holds what every command needs (config, data dir, session
//! store). [`AgentRuntime`] adds the provider, compactor, subagents, tools
//! and the loop itself, and is only built by commands that talk to a model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pincer_core::agent::agent_loop::{AgentLoop, LoopSettings};
use pincer_core::agent::context::PromptContextBuilder;
use pincer_core::agent::subagent::SubagentManager;
use pincer_core::agent::tools::ToolRegistry;
use pincer_core::compaction::compactor::{CompactionSettings, Compactor};
use pincer_core::message::bus::MessageBus;
use pincer_core::session::store::SessionStore;
use pincer_infra::config::{load_config, resolve_data_dir, sessions_dir};
use pincer_infra::llm::factory::create_provider;
use pincer_infra::session::json_file::JsonFileSessionStore;
use pincer_types::config::PincerConfig;

use crate::tools::{MessageTool, SpawnTool};

/// Standing instructions picked up from the data directory.
const BOOTSTRAP_FILE: &str = "AGENTS.md";

pub struct AppState {
    pub config: PincerConfig,
    pub data_dir: PathBuf,
    pub store: Arc<SessionStore>,
}

impl AppState {
    /// Resolve the data dir, load config and every persisted session.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir(data_dir);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;
        let sessions = sessions_dir(&config, &data_dir);
        let store = SessionStore::load(JsonFileSessionStore::new(&sessions))
            .await
            .with_context(|| format!("failed to load sessions from {}", sessions.display()))?;
        debug!(sessions = %sessions.display(), "session store ready");

        Ok(Self {
            config,
            data_dir,
            store: Arc::new(store),
        })
    }

    /// Build the provider and everything that depends on it.
    pub async fn runtime(&self) -> anyhow::Result<AgentRuntime> {
        let config = &self.config;
        let provider = Arc::new(create_provider(config).context("no usable LLM provider")?);
        let shutdown = CancellationToken::new();
        let bus = Arc::new(MessageBus::new());
        let model = config.agent.model.clone();

        let compactor = Arc::new(
            Compactor::new(
                Arc::clone(&self.store),
                Arc::clone(&provider),
                CompactionSettings::new(&config.compaction, model.clone(), config.agent.context_window),
            )
            .with_shutdown(shutdown.child_token()),
        );

        let subagents = Arc::new(
            SubagentManager::new(Arc::clone(&provider), Arc::clone(&bus), model)
                .with_shutdown(shutdown.child_token()),
        );

        let mut tools = ToolRegistry::new();
        tools.register(SpawnTool::new(Arc::clone(&subagents)));
        tools.register(MessageTool::new(Arc::clone(&bus)));

        let context = PromptContextBuilder::new().with_bootstrap(
            bootstrap_text(&self.data_dir, config.agent.system_prompt.as_deref()).await,
        );

        let agent = AgentLoop::new(
            provider,
            Arc::clone(&self.store),
            compactor,
            Arc::new(context),
            Arc::new(tools),
            LoopSettings::from_config(&config.agent),
        );
        info!(tools = ?agent.tool_names(), "agent ready");

        Ok(AgentRuntime {
            agent: Arc::new(agent),
            bus,
            subagents,
            shutdown,
        })
    }
}

/// A wired agent plus the handles needed to drive and stop it.
pub struct AgentRuntime {
    pub agent: Arc<AgentLoop>,
    pub bus: Arc<MessageBus>,
    pub subagents: Arc<SubagentManager>,
    /// Cancels turns, compactions and subagents.
    pub shutdown: CancellationToken,
}

impl AgentRuntime {
    /// Cancel everything on the first Ctrl+C.
    pub fn cancel_on_ctrl_c(&self) {
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                token.cancel();
            }
        });
    }
}

/// Configured system prompt followed by `AGENTS.md`, when either exists.
async fn bootstrap_text(data_dir: &Path, system_prompt: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
        parts.push(prompt.trim().to_string());
    }
    if let Ok(text) = tokio::fs::read_to_string(data_dir.join(BOOTSTRAP_FILE)).await {
        if !text.trim().is_empty() {
            parts.push(text.trim().to_string());
        }
    }
    parts.join("\n\n")
}
