//! Read-side document tools, research logging and position lookup.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{ToolArgs, ToolContext, ToolError, ToolName, ToolResult, ToolHandler};
use crate::domain::models::ProposedAction;

fn storage_error(what: &str, err: &anyhow::Error) -> ToolError {
    ToolError::Failed(format!("Failed to {what}: {err}"))
}

pub struct ReadSpecHandler {
    ctx: Arc<ToolContext>,
}

impl ReadSpecHandler {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for ReadSpecHandler {
    async fn handle(&self, args: ToolArgs, _cancel: &CancellationToken) -> ToolResult {
        let module = self.ctx.module_arg(&args, "module");
        let spec = self
            .ctx
            .documents
            .load_spec(&module)
            .await
            .map_err(|e| storage_error("load spec", &e))?
            .ok_or_else(|| ToolError::Failed(format!("No specification found for module '{module}'")))?;

        Ok(json!({
            "success": true,
            "status": "ok",
            "module": module,
            "content": spec,
            "message": format!("Specification for module '{module}'"),
        }))
    }
}

pub struct ReadResearchHandler {
    ctx: Arc<ToolContext>,
}

impl ReadResearchHandler {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for ReadResearchHandler {
    async fn handle(&self, args: ToolArgs, _cancel: &CancellationToken) -> ToolResult {
        let module = self.ctx.module_arg(&args, "module");
        let research = self
            .ctx
            .documents
            .load_research(&module)
            .await
            .map_err(|e| storage_error("load research", &e))?;

        let message = if research.is_some() {
            format!("Research notes for module '{module}'")
        } else {
            format!("No research logged yet for module '{module}'")
        };
        Ok(json!({
            "success": true,
            "status": "ok",
            "module": module,
            "content": research.unwrap_or_default(),
            "message": message,
        }))
    }
}

pub struct ReadPlanHandler {
    ctx: Arc<ToolContext>,
}

impl ReadPlanHandler {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for ReadPlanHandler {
    async fn handle(&self, args: ToolArgs, _cancel: &CancellationToken) -> ToolResult {
        let module = self.ctx.module_arg(&args, "module");
        let plan = self
            .ctx
            .documents
            .load_plan(&module)
            .await
            .map_err(|e| storage_error("load plan", &e))?;

        let message = if plan.is_some() {
            format!("Implementation plan for module '{module}'")
        } else {
            format!("No plan exists yet for module '{module}'")
        };
        Ok(json!({
            "success": true,
            "status": "ok",
            "module": module,
            "content": plan.unwrap_or_default(),
            "message": message,
        }))
    }
}

pub struct GetCurrentContextHandler {
    ctx: Arc<ToolContext>,
}

impl GetCurrentContextHandler {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for GetCurrentContextHandler {
    async fn handle(&self, _args: ToolArgs, _cancel: &CancellationToken) -> ToolResult {
        let position = self.ctx.position();
        let iteration = self.ctx.iteration();

        Ok(json!({
            "success": true,
            "status": "ok",
            "module": position.module_name,
            "phase": position.phase.as_str(),
            "step": position.step.number(),
            "step_name": position.step.as_str(),
            "component": position.component_name,
            "task": position.task_name,
            "iteration": iteration.iteration(),
            "tool_calls": iteration.tool_call_count(),
            "message": format!(
                "Module '{}', step {} in phase {}",
                position.module_name, position.step, position.phase
            ),
        }))
    }
}

pub struct LogResearchHandler {
    ctx: Arc<ToolContext>,
}

impl LogResearchHandler {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ToolHandler for LogResearchHandler {
    async fn handle(&self, args: ToolArgs, _cancel: &CancellationToken) -> ToolResult {
        let topic = args.require("topic")?;
        let findings = args.require("findings")?;
        self.ctx
            .check_guardrails(ProposedAction::tool(ToolName::LogResearch.as_str()))?;

        let module = self.ctx.position().module_name;
        self.ctx
            .documents
            .append_research(&module, &topic, &findings)
            .await
            .map_err(|e| storage_error("append research", &e))?;

        info!(module = %module, topic = %topic, "research logged");
        Ok(json!({
            "success": true,
            "status": "logged",
            "topic": topic,
            "message": format!("Research on '{topic}' logged for module '{module}'"),
        }))
    }
}
