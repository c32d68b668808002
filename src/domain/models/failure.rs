//! Failure classification results.

use serde::{Deserialize, Serialize};

/// How bad a classified condition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    TaskFailure,
    RepeatedFailure,
    Critical,
}

/// What the orchestrator does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    /// Re-prompt the backend inline on the same task.
    SelfCorrect,
    /// Pause and surface the task to the operator.
    PromptUser,
    /// Halt all further progress.
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub severity: Severity,
    pub action: FailureAction,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Consecutive failures for the task, zero when not task-scoped.
    pub count: u32,
}
