//! `verify_*_completion` tools backed by the oracle.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{field, info_span, warn, Instrument};

use super::{ToolArgs, ToolContext, ToolError, ToolHandler, ToolName, ToolResult};
use crate::domain::errors::OrchestratorError;
use crate::domain::models::{ProposedAction, Verdict, VerificationKey, VerificationScope};
use crate::services::oracle::OracleRequest;
use crate::services::plan::Plan;

pub struct VerifyCompletionHandler {
    ctx: Arc<ToolContext>,
    tool: ToolName,
    scope: VerificationScope,
}

impl VerifyCompletionHandler {
    /// `None` unless `tool` is one of the verification tools.
    pub fn new(ctx: Arc<ToolContext>, tool: ToolName) -> Option<Self> {
        let scope = tool.verification_scope()?;
        Some(Self { ctx, tool, scope })
    }

    fn target_id(&self, args: &ToolArgs) -> Result<String, ToolError> {
        match self.scope {
            VerificationScope::Task => args.require("task_id"),
            VerificationScope::Component => args.require("component_name"),
            VerificationScope::Module => Ok(self.ctx.module_arg(args, "module_name")),
        }
    }

    /// Acceptance criteria drawn from the module's plan or spec.
    async fn criteria(&self, module: &str, id: &str) -> String {
        match self.scope {
            VerificationScope::Task | VerificationScope::Component => {
                let plan = match self.ctx.documents.load_plan(module).await {
                    Ok(plan) => plan.map(|text| Plan::parse(&text)),
                    Err(err) => {
                        warn!(module = %module, error = %err, "plan unavailable for verification");
                        None
                    }
                };
                let from_plan = plan.and_then(|plan| match self.scope {
                    VerificationScope::Task => plan.find_task(id).map(|t| t.text.clone()),
                    _ => plan.component(id).map(|c| {
                        c.tasks
                            .iter()
                            .map(|t| format!("- {}", t.text))
                            .collect::<Vec<_>>()
                            .join("\n")
                    }),
                });
                from_plan.unwrap_or_else(|| format!("{} '{}' as described in the plan", self.scope, id))
            }
            VerificationScope::Module => match self.ctx.documents.load_spec(module).await {
                Ok(Some(spec)) => spec,
                Ok(None) => format!("All components of module '{module}' are built and verified"),
                Err(err) => {
                    warn!(module = %module, error = %err, "spec unavailable for verification");
                    format!("All components of module '{module}' are built and verified")
                }
            },
        }
    }
}

#[async_trait]
impl ToolHandler for VerifyCompletionHandler {
    async fn handle(&self, args: ToolArgs, cancel: &CancellationToken) -> ToolResult {
        let id = self.target_id(&args)?;
        self.ctx.check_guardrails(ProposedAction::tool(self.tool.as_str()))?;

        let module = self.ctx.position().module_name;
        let request = OracleRequest {
            key: VerificationKey::new(self.scope, id.clone()),
            criteria: self.criteria(&module, &id).await,
            module_name: module,
            evidence: args.get_str("evidence"),
        };

        let span = info_span!(
            "verification",
            scope = %self.scope,
            id = %id,
            verdict = field::Empty
        );
        let verdict = match self
            .ctx
            .oracle
            .verify(&request, cancel)
            .instrument(span.clone())
            .await
        {
            Ok(verdict) => verdict,
            Err(OrchestratorError::Cancelled) => return Err(ToolError::Cancelled),
            Err(other) => Verdict::Error {
                message: other.to_string(),
            },
        };
        span.record("verdict", verdict.label());

        let record = self
            .ctx
            .tracker
            .record_verification(self.scope, &id, verdict.passed());

        let payload = match &verdict {
            Verdict::Pass => json!({
                "success": true,
                "status": "verified",
                "verdict": verdict.label(),
                "passed": true,
                "iteration": record.iteration,
                "message": format!("{} '{}' passed verification", self.scope, id),
            }),
            Verdict::Fail { gaps } => json!({
                "success": true,
                "status": "gaps_found",
                "verdict": verdict.label(),
                "passed": false,
                "gaps": gaps,
                "iteration": record.iteration,
                "message": format!(
                    "{} '{}' failed verification; address the gaps and verify again",
                    self.scope, id
                ),
            }),
            Verdict::Error { message } => json!({
                "success": false,
                "status": "error",
                "verdict": verdict.label(),
                "passed": false,
                "error": message,
                "message": format!("Verification of {} '{}' could not complete: {}", self.scope, id, message),
            }),
        };
        Ok(payload)
    }
}
