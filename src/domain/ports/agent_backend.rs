//! Agent backend port.
//!
//! The backend is an untrusted, stateless LLM with tool calling. Each
//! workflow step invokes it once with a freshly assembled context; all
//! continuity lives in the orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::domain::models::Usage;

/// Tool made available to the backend for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the parameter object.
    pub parameters: serde_json::Value,
}

/// Request for one fresh-context invocation.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Logical sub-session label; oracle calls use their own.
    pub session_label: String,
    pub system_prompt: String,
    pub model: String,
    pub tools: Vec<ToolDefinition>,
}

/// A tool call awaiting its result.
#[derive(Debug)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    /// Raw parameter payload exactly as the backend produced it.
    pub parameters: String,
    /// Result JSON goes back here.
    pub reply: oneshot::Sender<String>,
}

/// Work the backend did with its own native tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NativeToolActivity {
    FileRead { path: String },
    Command { command: String, succeeded: bool },
}

/// Message delivered on the per-invocation event channel.
///
/// `Idle` and `Error` are terminal.
#[derive(Debug)]
pub enum BackendEvent {
    Delta(String),
    ToolCall(ToolCallRequest),
    NativeTool(NativeToolActivity),
    Usage(Usage),
    Idle { final_message: String },
    Error { message: String },
}

impl BackendEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle { .. } | Self::Error { .. })
    }
}

/// Port trait for agent backend implementations
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; tool calls within one invocation
/// may be issued concurrently.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Run one invocation, streaming events into `events`.
    ///
    /// Returns once the invocation has ended. Tool call results are awaited
    /// on each request's `reply` channel. An `Err` means the invocation could
    /// not be started or was aborted by the backend.
    async fn invoke(
        &self,
        request: InvocationRequest,
        events: mpsc::Sender<BackendEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()>;

    /// Model identifiers the backend currently reports as available.
    async fn available_models(&self) -> anyhow::Result<Vec<String>>;
}
