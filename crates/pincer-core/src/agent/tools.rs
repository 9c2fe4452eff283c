//! Tool trait, its dyn wrapper and the registry the agent loop executes
//! tool calls through.
//!
//! Arguments are validated against the tool's declared schema before the
//! tool runs, and execution observes the turn's cancellation token.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use pincer_types::tool::{ToolArgumentError, ToolArguments, ToolDefinition};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Conversation a tool call belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    pub channel: String,
    pub chat_id: String,
}

impl ToolContext {
    pub fn new(channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
        }
    }
}

/// Errors from resolving or running a tool. Fed back to the model as text.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("invalid arguments for '{tool}': {source}")]
    InvalidArguments {
        tool: String,
        #[source]
        source: ToolArgumentError,
    },

    #[error("{0}")]
    Execution(String),

    #[error("tool execution cancelled")]
    Cancelled,
}

/// A capability the model can invoke.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool with already-validated arguments.
    fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolContext,
    ) -> impl Future<Output = Result<String, ToolError>> + Send;
}

/// Object-safe version of [`Tool`] with boxed futures.
pub trait ToolDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        args: &'a ToolArguments,
        ctx: &'a ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>>;
}

impl<T: Tool> ToolDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        args: &'a ToolArguments,
        ctx: &'a ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>> {
        Box::pin(self.execute(args, ctx))
    }
}

/// Type-erased tool with its definition captured at registration.
pub struct BoxTool {
    definition: ToolDefinition,
    inner: Box<dyn ToolDyn + Send + Sync>,
}

impl BoxTool {
    pub fn new<T: Tool + 'static>(tool: T) -> Self {
        Self {
            definition: tool.definition(),
            inner: Box::new(tool),
        }
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    pub async fn execute(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<String, ToolError> {
        self.inner.execute_boxed(args, ctx).await
    }
}

/// Tools available to the agent, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, BoxTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool`, replacing any tool with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let tool = BoxTool::new(tool);
        debug!(tool = %tool.definition().name, "registered tool");
        self.tools.insert(tool.definition().name.clone(), tool);
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition().clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate `args` and run the named tool, aborting on `cancel`.
    pub async fn execute(
        &self,
        name: &str,
        args: &ToolArguments,
        ctx: &ToolContext,
        cancel: &CancellationToken,
    ) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        tool.definition()
            .validate(args)
            .map_err(|source| ToolError::InvalidArguments {
                tool: name.to_string(),
                source,
            })?;

        info!(tool = %name, args = %args, "executing tool");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ToolError::Cancelled),
            result = tool.execute(args, ctx) => result,
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
