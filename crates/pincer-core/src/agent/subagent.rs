//! Background subagents.
//!
//! A subagent takes a self-contained task, runs it against the provider in a
//! detached task and reports the result back to the session that spawned it
//! by publishing a system-channel message on the bus.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pincer_types::bus::{InboundMessage, SYSTEM_CHANNEL};
use pincer_types::llm::{ChatRequest, Message, RequestOptions};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::llm::box_provider::BoxLlmProvider;
use crate::message::bus::MessageBus;

const SUBAGENT_PROMPT: &str = "You are a subagent working on a single delegated task. \
Complete the task and reply with the result only. Be thorough but concise; \
the result is relayed to the main agent, not shown directly to the user.";

/// Label length used when the caller gives none.
const LABEL_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubagentStatus {
    Running,
    Completed,
    Failed,
}

/// Bookkeeping for one spawned subagent.
#[derive(Debug, Clone, Serialize)]
pub struct SubagentTask {
    pub id: String,
    pub label: String,
    pub task: String,
    pub origin_channel: String,
    pub origin_chat_id: String,
    pub status: SubagentStatus,
    pub result: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Handle returned by [`SubagentManager::spawn`].
#[derive(Debug)]
pub struct SpawnedSubagent {
    pub id: String,
    pub label: String,
    pub handle: JoinHandle<()>,
}

/// Spawns and tracks background subagents.
pub struct SubagentManager {
    provider: Arc<BoxLlmProvider>,
    bus: Arc<MessageBus>,
    model: String,
    options: RequestOptions,
    tasks: DashMap<String, SubagentTask>,
    shutdown: CancellationToken,
}

impl SubagentManager {
    pub fn new(provider: Arc<BoxLlmProvider>, bus: Arc<MessageBus>, model: impl Into<String>) -> Self {
        Self {
            provider,
            bus,
            model: model.into(),
            options: RequestOptions::new(4096, 0.7),
            tasks: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Start `task` in the background. The result is announced on the bus
    /// as a system message addressed to `origin_channel:origin_chat_id`.
    pub fn spawn(
        self: &Arc<Self>,
        task: impl Into<String>,
        label: Option<String>,
        origin_channel: impl Into<String>,
        origin_chat_id: impl Into<String>,
    ) -> SpawnedSubagent {
        let task = task.into();
        let id = short_id();
        let label = label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| default_label(&task));

        let record = SubagentTask {
            id: id.clone(),
            label: label.clone(),
            task,
            origin_channel: origin_channel.into(),
            origin_chat_id: origin_chat_id.into(),
            status: SubagentStatus::Running,
            result: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        self.tasks.insert(id.clone(), record.clone());
        info!(subagent_id = %id, label = %label, "subagent spawned");

        let this = Arc::clone(self);
        let span = info_span!("subagent", subagent_id = %id);
        let handle = tokio::spawn(async move { this.run(record).await }.instrument(span));

        SpawnedSubagent { id, label, handle }
    }

    async fn run(&self, record: SubagentTask) {
        let request = ChatRequest::new(vec![
            Message::system(SUBAGENT_PROMPT),
            Message::user(record.task.clone()),
        ])
        .with_model(self.model.clone())
        .with_options(self.options);

        let cancel = self.shutdown.child_token();
        let (status, result) = match self.provider.chat(&request, &cancel).await {
            Ok(response) => (SubagentStatus::Completed, response.content),
            Err(err) => {
                warn!(error = %err, "subagent failed");
                (SubagentStatus::Failed, format!("Error: {err}"))
            }
        };

        if let Some(mut entry) = self.tasks.get_mut(&record.id) {
            entry.status = status;
            entry.result = Some(result.clone());
            entry.finished_at = Some(Utc::now());
        }

        if cancel.is_cancelled() {
            return;
        }

        let outcome = match status {
            SubagentStatus::Failed => "failed",
            _ => "completed",
        };
        let announcement = InboundMessage::new(
            SYSTEM_CHANNEL,
            format!("subagent:{}", record.id),
            format!("{}:{}", record.origin_channel, record.origin_chat_id),
            format!(
                "Task '{}' {outcome}.\n\nResult:\n{result}",
                record.label
            ),
        );
        if let Err(err) = self.bus.publish_inbound(announcement).await {
            warn!(error = %err, "failed to announce subagent result");
        }
    }

    pub fn get(&self, id: &str) -> Option<SubagentTask> {
        self.tasks.get(id).map(|entry| entry.clone())
    }

    /// Every task, oldest first.
    pub fn list(&self) -> Vec<SubagentTask> {
        let mut tasks: Vec<SubagentTask> = self.tasks.iter().map(|e| e.value().clone()).collect();
        tasks.sort_by_key(|t| t.started_at);
        tasks
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|e| e.status == SubagentStatus::Running)
            .count()
    }
}

fn short_id() -> String {
    let id = Uuid::now_v7().simple().to_string();
    id[id.len() - 8..].to_string()
}

fn default_label(task: &str) -> String {
    let trimmed = task.trim();
    if trimmed.chars().count() <= LABEL_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(LABEL_CHARS).collect();
    format!("{cut}...")
}
