//! Tool handlers bound by the dispatcher.
//!
//! Handlers share a [`ToolContext`] owned by the orchestrator. Failures are
//! returned as [`ToolError`]s which the dispatcher turns into in-band JSON
//! error payloads; only cancellation escapes the dispatcher.

pub mod catalog;
mod documents;
mod status;
mod verify;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{Decision, ProposedAction, WorkflowPosition};
use crate::domain::ports::{CommitAutomation, DocumentStore};
use crate::services::failure_classifier::FailureClassifier;
use crate::services::guardrails::GuardrailPipeline;
use crate::services::iteration::IterationState;
use crate::services::oracle::OracleVerifier;
use crate::services::tool_dispatcher::ToolDispatcher;
use crate::services::verification_tracker::VerificationTracker;

pub use catalog::ToolName;
pub use documents::{
    GetCurrentContextHandler, LogResearchHandler, ReadPlanHandler, ReadResearchHandler,
    ReadSpecHandler,
};
pub use status::{ReportProgressHandler, UpdateTaskStatusHandler};
pub use verify::VerifyCompletionHandler;

/// Why a tool call did not succeed.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{reason}")]
    Denied { guardrail: String, reason: String },

    #[error("{0}")]
    Failed(String),

    #[error("Tool call cancelled")]
    Cancelled,
}

impl ToolError {
    /// Value of the `status` field in the error payload.
    pub fn status(&self) -> &'static str {
        match self {
            Self::InvalidParameters(_) => "invalid_parameters",
            Self::Denied { .. } => "denied",
            Self::Failed(_) => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

pub type ToolResult = Result<Value, ToolError>;

/// Named parameters of one tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: Map<String, Value>,
    recovered: bool,
}

impl ToolArgs {
    /// Parse a raw payload.
    ///
    /// Invalid JSON, or JSON that is not an object, is taken as the value of
    /// the tool's primary field instead of failing the call.
    pub fn parse(tool: ToolName, raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(values)) => Self {
                values,
                recovered: false,
            },
            Ok(Value::Null) => Self::default(),
            Ok(Value::String(text)) => Self::recover(tool, Value::String(text)),
            Ok(other) => Self::recover(tool, Value::String(other.to_string())),
            Err(_) => Self::recover(tool, Value::String(trimmed.to_string())),
        }
    }

    fn recover(tool: ToolName, value: Value) -> Self {
        let mut values = Map::new();
        if let Some(field) = tool.primary_field() {
            values.insert(field.to_string(), value);
        }
        Self {
            values,
            recovered: true,
        }
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values,
            recovered: false,
        }
    }

    /// True when the payload was malformed and reinterpreted.
    pub fn was_recovered(&self) -> bool {
        self.recovered
    }

    /// String value of `name`; numbers and booleans are stringified.
    pub fn get_str(&self, name: &str) -> Option<String> {
        match self.values.get(name)? {
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn require(&self, name: &str) -> Result<String, ToolError> {
        self.get_str(name).ok_or_else(|| {
            ToolError::InvalidParameters(format!("missing required parameter '{name}'"))
        })
    }

    /// Fail with one message naming every missing field.
    pub fn validate_required(&self, fields: &[&str]) -> Result<(), ToolError> {
        let missing: Vec<&str> = fields
            .iter()
            .copied()
            .filter(|f| self.get_str(f).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidParameters(format!(
                "missing required parameter(s): {}",
                missing.join(", ")
            )))
        }
    }

    pub fn get_bool(&self, name: &str) -> bool {
        match self.values.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
            _ => false,
        }
    }

    /// List value of `name`: a JSON array of strings or a comma-separated string.
    pub fn get_list(&self, name: &str) -> Vec<String> {
        match self.values.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A bound tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, args: ToolArgs, cancel: &CancellationToken) -> ToolResult;
}

/// State shared by every handler of a session.
pub struct ToolContext {
    pub documents: Arc<dyn DocumentStore>,
    pub commits: Option<Arc<dyn CommitAutomation>>,
    pub tracker: Arc<VerificationTracker>,
    pub classifier: Arc<FailureClassifier>,
    pub guardrails: GuardrailPipeline,
    pub oracle: Arc<OracleVerifier>,
    position: RwLock<WorkflowPosition>,
    iteration: RwLock<Arc<IterationState>>,
}

impl ToolContext {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        commits: Option<Arc<dyn CommitAutomation>>,
        tracker: Arc<VerificationTracker>,
        classifier: Arc<FailureClassifier>,
        guardrails: GuardrailPipeline,
        oracle: Arc<OracleVerifier>,
        position: WorkflowPosition,
    ) -> Self {
        let iteration = Arc::new(IterationState::new(
            tracker.current_iteration(),
            position.module_name.clone(),
            position.task_name.clone(),
        ));
        Self {
            documents,
            commits,
            tracker,
            classifier,
            guardrails,
            oracle,
            position: RwLock::new(position),
            iteration: RwLock::new(iteration),
        }
    }

    pub fn position(&self) -> WorkflowPosition {
        self.position
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_position(&self, position: WorkflowPosition) {
        *self.position.write().unwrap_or_else(PoisonError::into_inner) = position;
    }

    pub fn iteration(&self) -> Arc<IterationState> {
        Arc::clone(&self.iteration.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Install a fresh iteration; verdicts logged from now on carry its number.
    pub fn begin_iteration(&self, state: Arc<IterationState>) {
        self.tracker.begin_iteration(state.iteration());
        *self.iteration.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Run the guardrail pipeline for `action` against the live iteration.
    pub fn check_guardrails(&self, action: ProposedAction) -> Result<(), ToolError> {
        let context = self.iteration().guardrail_context().with_action(action);
        match self.guardrails.evaluate(&context) {
            Decision::Allow => Ok(()),
            Decision::Deny { guardrail, reason } => Err(ToolError::Denied { guardrail, reason }),
        }
    }

    /// Module named by `field`, or the current module.
    pub(crate) fn module_arg(&self, args: &ToolArgs, field: &str) -> String {
        args.get_str(field)
            .unwrap_or_else(|| self.position().module_name)
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("position", &self.position())
            .field("guardrails", &self.guardrails)
            .finish_non_exhaustive()
    }
}

/// Bind every built-in tool to `dispatcher`.
pub fn register_builtin_tools(
    dispatcher: &mut ToolDispatcher,
    context: &Arc<ToolContext>,
    commit_on_completion: bool,
) {
    let ctx = || Arc::clone(context);
    dispatcher.bind_handler(ToolName::ReadSpec, Arc::new(ReadSpecHandler::new(ctx())));
    dispatcher.bind_handler(ToolName::ReadResearch, Arc::new(ReadResearchHandler::new(ctx())));
    dispatcher.bind_handler(ToolName::ReadPlan, Arc::new(ReadPlanHandler::new(ctx())));
    dispatcher.bind_handler(
        ToolName::UpdateTaskStatus,
        Arc::new(UpdateTaskStatusHandler::new(ctx(), commit_on_completion)),
    );
    dispatcher.bind_handler(
        ToolName::GetCurrentContext,
        Arc::new(GetCurrentContextHandler::new(ctx())),
    );
    dispatcher.bind_handler(ToolName::LogResearch, Arc::new(LogResearchHandler::new(ctx())));
    dispatcher.bind_handler(
        ToolName::ReportProgress,
        Arc::new(ReportProgressHandler::new(ctx())),
    );
    for tool in [
        ToolName::VerifyTaskCompletion,
        ToolName::VerifyComponentCompletion,
        ToolName::VerifyModuleCompletion,
    ] {
        if let Some(handler) = VerifyCompletionHandler::new(ctx(), tool) {
            dispatcher.bind_handler(tool, Arc::new(handler));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object() {
        let args = ToolArgs::parse(
            ToolName::UpdateTaskStatus,
            r#"{"task_id":"T1","status":"complete"}"#,
        );
        assert!(!args.was_recovered());
        assert_eq!(args.get_str("task_id").as_deref(), Some("T1"));
    }

    #[test]
    fn test_malformed_payload_recovers_primary_field() {
        let args = ToolArgs::parse(ToolName::VerifyTaskCompletion, "T1");
        assert!(args.was_recovered());
        assert_eq!(args.get_str("task_id").as_deref(), Some("T1"));

        let truncated = ToolArgs::parse(ToolName::ReportProgress, r#"{"message": "half"#);
        assert!(truncated.was_recovered());
        assert_eq!(
            truncated.get_str("message").as_deref(),
            Some(r#"{"message": "half"#)
        );
    }

    #[test]
    fn test_validate_required_names_missing_fields() {
        let args = ToolArgs::parse(ToolName::UpdateTaskStatus, "T1");
        let err = args
            .validate_required(&ToolName::UpdateTaskStatus.required_fields())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid parameters: missing required parameter(s): status"
        );
    }

    #[test]
    fn test_lists_and_bools() {
        let args = ToolArgs::from_map(
            json!({"components": ["a", " b "], "step_complete": "true", "csv": "x, y"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert_eq!(args.get_list("components"), vec!["a", "b"]);
        assert_eq!(args.get_list("csv"), vec!["x", "y"]);
        assert!(args.get_bool("step_complete"));
        assert!(!args.get_bool("missing"));
    }
}
