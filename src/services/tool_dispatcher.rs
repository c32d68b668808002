//! Name → handler registry for agent tool calls.
//!
//! Every dispatch runs inside a `tool_call` span that records the tool name
//! and whether the result carried an error marker. Handler errors become
//! JSON error payloads so the agent loop stays alive; only cancellation is
//! returned to the caller.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, field, info_span, warn, Instrument};

use crate::domain::ports::ToolDefinition;
use crate::services::tools::{ToolArgs, ToolError, ToolHandler, ToolName};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Tool call cancelled")]
    Cancelled,
}

#[derive(Default, Clone)]
pub struct ToolDispatcher {
    handlers: BTreeMap<ToolName, Arc<dyn ToolHandler>>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `tool`, replacing any earlier binding.
    pub fn bind_handler(&mut self, tool: ToolName, handler: Arc<dyn ToolHandler>) {
        if self.handlers.insert(tool, handler).is_some() {
            warn!(tool = %tool, "tool handler rebound");
        }
    }

    pub fn is_bound(&self, tool: ToolName) -> bool {
        self.handlers.contains_key(&tool)
    }

    /// Definitions of every bound tool, in a stable order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.handlers.keys().map(ToolName::definition).collect()
    }

    /// Run one tool call and return its result JSON.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        parameters: &str,
        cancel: &CancellationToken,
    ) -> Result<String, DispatchError> {
        let span = info_span!("tool_call", tool = %tool_name, success = field::Empty);
        let result = self
            .dispatch_inner(tool_name, parameters, cancel)
            .instrument(span.clone())
            .await?;

        let success = !carries_error(&result);
        span.record("success", success);
        Ok(result.to_string())
    }

    async fn dispatch_inner(
        &self,
        tool_name: &str,
        parameters: &str,
        cancel: &CancellationToken,
    ) -> Result<Value, DispatchError> {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let tool = match tool_name.parse::<ToolName>() {
            Ok(tool) => tool,
            Err(message) => {
                warn!(tool = %tool_name, "unknown tool requested");
                return Ok(error_payload("unknown_tool", &message));
            }
        };
        let Some(handler) = self.handlers.get(&tool) else {
            warn!(tool = %tool, "tool requested but not bound");
            return Ok(error_payload(
                "unknown_tool",
                &format!("Tool '{tool}' is not available"),
            ));
        };

        let args = ToolArgs::parse(tool, parameters);
        if args.was_recovered() {
            warn!(
                tool = %tool,
                field = tool.primary_field().unwrap_or("-"),
                "malformed tool parameters, using single-field interpretation"
            );
        }
        if let Err(err) = args.validate_required(&tool.required_fields()) {
            return Ok(tool_error_payload(&err));
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ToolError::Cancelled),
            result = handler.handle(args, cancel) => result,
        };

        match outcome {
            Ok(value) => {
                debug!(tool = %tool, "tool call handled");
                Ok(value)
            }
            Err(ToolError::Cancelled) => Err(DispatchError::Cancelled),
            Err(err) => {
                if matches!(err, ToolError::Denied { .. }) {
                    debug!(tool = %tool, "tool call denied by guardrail");
                } else {
                    warn!(tool = %tool, error = %err, "tool call failed");
                }
                Ok(tool_error_payload(&err))
            }
        }
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

fn error_payload(error: &str, message: &str) -> Value {
    json!({
        "success": false,
        "status": "error",
        "error": error,
        "message": message,
    })
}

fn tool_error_payload(err: &ToolError) -> Value {
    let mut payload = json!({
        "success": false,
        "status": err.status(),
        "error": err.status(),
        "message": err.to_string(),
    });
    if let ToolError::Denied { guardrail, .. } = err {
        payload["guardrail"] = json!(guardrail);
    }
    payload
}

/// A result carries an error marker when `success` is false or an `error`
/// field is present.
fn carries_error(result: &Value) -> bool {
    result.get("success").and_then(Value::as_bool) == Some(false) || result.get("error").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::services::tools::ToolResult;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn handle(&self, args: ToolArgs, _cancel: &CancellationToken) -> ToolResult {
            Ok(json!({
                "success": true,
                "status": "ok",
                "message": args.get_str("message").unwrap_or_default(),
            }))
        }
    }

    struct Hangs;

    #[async_trait]
    impl ToolHandler for Hangs {
        async fn handle(&self, _args: ToolArgs, cancel: &CancellationToken) -> ToolResult {
            cancel.cancelled().await;
            Err(ToolError::Cancelled)
        }
    }

    struct Fails;

    #[async_trait]
    impl ToolHandler for Fails {
        async fn handle(&self, _args: ToolArgs, _cancel: &CancellationToken) -> ToolResult {
            Err(ToolError::Failed("disk full".to_string()))
        }
    }

    fn parse(result: &str) -> Value {
        serde_json::from_str(result).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_to_bound_handler() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.bind_handler(ToolName::ReportProgress, Arc::new(Echo));

        let result = dispatcher
            .dispatch("report_progress", r#"{"message":"half way"}"#, &CancellationToken::new())
            .await
            .unwrap();
        let value = parse(&result);
        assert_eq!(value["success"], true);
        assert_eq!(value["message"], "half way");
    }

    #[tokio::test]
    async fn test_malformed_parameters_use_primary_field() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.bind_handler(ToolName::ReportProgress, Arc::new(Echo));

        let result = dispatcher
            .dispatch("report_progress", "plain text progress", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(parse(&result)["message"], "plain text progress");
    }

    #[tokio::test]
    async fn test_missing_required_field_is_error_payload() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.bind_handler(ToolName::UpdateTaskStatus, Arc::new(Echo));

        let result = dispatcher
            .dispatch("update_task_status", r#"{"task_id":"T1"}"#, &CancellationToken::new())
            .await
            .unwrap();
        let value = parse(&result);
        assert_eq!(value["success"], false);
        assert_eq!(value["status"], "invalid_parameters");
        assert!(value["message"].as_str().unwrap().contains("status"));
    }

    #[tokio::test]
    async fn test_unknown_and_unbound_tools() {
        let dispatcher = ToolDispatcher::new();
        let cancel = CancellationToken::new();

        let unknown = parse(&dispatcher.dispatch("rm_rf", "{}", &cancel).await.unwrap());
        assert_eq!(unknown["error"], "unknown_tool");

        let unbound = parse(&dispatcher.dispatch("read_spec", "{}", &cancel).await.unwrap());
        assert_eq!(unbound["success"], false);
    }

    #[tokio::test]
    async fn test_handler_failure_is_in_band() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.bind_handler(ToolName::ReadSpec, Arc::new(Fails));

        let value = parse(
            &dispatcher
                .dispatch("read_spec", "{}", &CancellationToken::new())
                .await
                .unwrap(),
        );
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "disk full");
    }

    #[tokio::test]
    async fn test_cancellation_escapes() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.bind_handler(ToolName::ReadSpec, Arc::new(Hangs));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            canceller.cancel();
        });

        let result = dispatcher.dispatch("read_spec", "{}", &cancel).await;
        assert_eq!(result, Err(DispatchError::Cancelled));
    }

    #[test]
    fn test_definitions_follow_bindings() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.bind_handler(ToolName::ReadPlan, Arc::new(Echo));
        dispatcher.bind_handler(ToolName::ReadSpec, Arc::new(Echo));

        let names: Vec<String> = dispatcher.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["read_spec", "read_plan"]);
    }
}
