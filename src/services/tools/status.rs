//! Mutating tools: task status and progress reports.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{ToolArgs, ToolContext, ToolError, ToolHandler, ToolName, ToolResult};
use crate::domain::models::{Phase, ProposedAction, Step, Trigger, VerificationKey};
use crate::services::iteration::ProgressReport;

/// Accepted values of the `status` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskStatus {
    InProgress,
    Complete,
    Failed,
}

impl TaskStatus {
    fn parse(raw: &str) -> Result<Self, ToolError> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "in_progress" | "started" => Ok(Self::InProgress),
            "complete" | "completed" | "done" => Ok(Self::Complete),
            "failed" | "blocked" => Ok(Self::Failed),
            other => Err(ToolError::InvalidParameters(format!(
                "unknown status '{other}'; expected in_progress, complete or failed"
            ))),
        }
    }
}

/// `update_task_status`: the one tool gated by the quality gate.
pub struct UpdateTaskStatusHandler {
    ctx: Arc<ToolContext>,
    commit_on_completion: bool,
}

impl UpdateTaskStatusHandler {
    pub fn new(ctx: Arc<ToolContext>, commit_on_completion: bool) -> Self {
        Self {
            ctx,
            commit_on_completion,
        }
    }

    async fn complete(&self, task_id: &str) -> ToolResult {
        self.ctx.check_guardrails(ProposedAction::mark_complete(
            ToolName::UpdateTaskStatus.as_str(),
            VerificationKey::task(task_id),
        ))?;

        let position = self.ctx.position();
        let module = position.module_name.as_str();
        self.ctx
            .documents
            .update_plan_checkbox(module, task_id, true)
            .await
            .map_err(|e| ToolError::Failed(format!("Failed to update plan for task '{task_id}': {e}")))?;

        self.ctx.iteration().record_completed_task(task_id);
        self.ctx.classifier.reset_failure_count(task_id);
        info!(module = %module, task_id = %task_id, "task marked complete");

        let commit = self.commit(module, position.component_name.as_deref(), task_id).await;
        Ok(json!({
            "success": true,
            "status": "complete",
            "task_id": task_id,
            "commit": commit,
            "message": format!("Task '{task_id}' marked complete"),
        }))
    }

    /// Best-effort commit; failures are logged and never undo the status.
    async fn commit(&self, module: &str, component: Option<&str>, task_id: &str) -> Value {
        let Some(commits) = self.ctx.commits.as_ref().filter(|_| self.commit_on_completion) else {
            return Value::Null;
        };

        match commits.commit_task_completion(module, component, task_id).await {
            Ok(outcome) => {
                if outcome.success {
                    info!(
                        task_id = %task_id,
                        commit = outcome.commit_hash.as_deref().unwrap_or("-"),
                        "task completion committed"
                    );
                } else {
                    warn!(task_id = %task_id, "commit automation reported failure");
                }
                json!(outcome)
            }
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "commit automation failed");
                json!({ "success": false, "error": err.to_string() })
            }
        }
    }
}

#[async_trait]
impl ToolHandler for UpdateTaskStatusHandler {
    async fn handle(&self, args: ToolArgs, _cancel: &CancellationToken) -> ToolResult {
        let task_id = args.require("task_id")?;
        let status = TaskStatus::parse(&args.require("status")?)?;

        match status {
            TaskStatus::Complete => self.complete(&task_id).await,
            TaskStatus::InProgress => Ok(json!({
                "success": true,
                "status": "in_progress",
                "task_id": task_id,
                "message": format!("Task '{task_id}' is in progress"),
            })),
            TaskStatus::Failed => {
                let notes = args
                    .get_str("notes")
                    .unwrap_or_else(|| "no details given".to_string());
                self.ctx
                    .iteration()
                    .record_failure(format!("task '{task_id}' failed: {notes}"));
                warn!(task_id = %task_id, notes = %notes, "agent reported task failure");
                Ok(json!({
                    "success": true,
                    "status": "failed",
                    "task_id": task_id,
                    "message": format!("Failure of task '{task_id}' recorded"),
                }))
            }
        }
    }
}

/// `report_progress`: records notes and proposes step triggers.
pub struct ReportProgressHandler {
    ctx: Arc<ToolContext>,
}

impl ReportProgressHandler {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }

    /// Trigger implied by finishing the current step, if the step is closed
    /// by a progress report at all.
    fn step_trigger(&self, args: &ToolArgs) -> Result<Option<Trigger>, ToolError> {
        let position = self.ctx.position();
        if position.phase == Phase::Research {
            return Ok(Some(Trigger::FinishResearch));
        }

        let trigger = match position.step {
            Step::GatherRequirements => Trigger::CompleteRequirements,
            Step::AnalyzeDependencies => Trigger::CompleteDependencies,
            Step::DefineComponents => {
                let components = args.get_list("components");
                if components.is_empty() {
                    return Err(ToolError::InvalidParameters(
                        "'components' must list the module's components to complete step 3"
                            .to_string(),
                    ));
                }
                Trigger::DefineComponents { components }
            }
            Step::PlanComponent => Trigger::CompletePlan,
            Step::ReviewPlan => match args.get_str("decision").as_deref() {
                Some("revise") => Trigger::RevisePlan,
                _ => Trigger::ApprovePlan,
            },
            // Building steps close through task status and verification.
            Step::ExecuteTasks | Step::ComponentRepeat => return Ok(None),
        };
        Ok(Some(trigger))
    }
}

#[async_trait]
impl ToolHandler for ReportProgressHandler {
    async fn handle(&self, args: ToolArgs, _cancel: &CancellationToken) -> ToolResult {
        let message = args.require("message")?;
        let step_complete = args.get_bool("step_complete");
        let iteration = self.ctx.iteration();

        let mut proposed = None;
        if let Some(topic) = args.get_str("research_topic") {
            proposed = Some(Trigger::StartResearch { topic });
        } else if step_complete {
            proposed = self.step_trigger(&args)?;
        }

        iteration.record_progress(ProgressReport {
            message,
            step_complete,
        });
        if let Some(trigger) = &proposed {
            info!(trigger = %trigger.kind(), "trigger proposed by progress report");
            iteration.propose_trigger(trigger.clone());
        }

        Ok(json!({
            "success": true,
            "status": "recorded",
            "step_complete": step_complete,
            "proposed_trigger": proposed.as_ref().map(|t| t.kind().as_str()),
            "message": "Progress recorded",
        }))
    }
}
