/// Storage ports (traits) for session state and project documents.
///
/// Services depend on these traits, not concrete implementations.
use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::{SessionMetrics, WorkflowSnapshot};

/// Repository trait for per-session state that must survive restarts
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the last persisted metrics for a session
    ///
    /// # Returns
    /// - `Some(SessionMetrics)` if found
    /// - `None` if the session has never been checkpointed
    ///
    /// # Errors
    /// Returns error if the stored value cannot be read or decoded. Callers
    /// treat decode failures as corruption and start fresh.
    async fn load_session_metrics(&self, session_id: &str) -> Result<Option<SessionMetrics>>;

    /// Persists metrics, replacing the previous value
    async fn save_session_metrics(&self, session_id: &str, metrics: &SessionMetrics) -> Result<()>;

    /// Loads the persisted workflow snapshot for a session
    async fn load_workflow(&self, session_id: &str) -> Result<Option<WorkflowSnapshot>>;

    /// Persists the workflow snapshot for a session
    async fn save_workflow(&self, session_id: &str, snapshot: &WorkflowSnapshot) -> Result<()>;
}

/// Read/write access to the module documents the agent works from
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Requirements specification for a module
    async fn load_spec(&self, module: &str) -> Result<Option<String>>;

    /// Accumulated research notes for a module
    async fn load_research(&self, module: &str) -> Result<Option<String>>;

    /// Appends a research entry under `topic`
    async fn append_research(&self, module: &str, topic: &str, findings: &str) -> Result<()>;

    /// Markdown implementation plan for a module
    async fn load_plan(&self, module: &str) -> Result<Option<String>>;

    /// Ticks or clears the checkbox of `task` in the module plan
    ///
    /// # Errors
    /// Returns error if the plan is missing or does not contain the task.
    async fn update_plan_checkbox(&self, module: &str, task: &str, completed: bool) -> Result<()>;
}
