//! Independent oracle verification.
//!
//! An oracle call is a separate logical sub-session on the same backend:
//! its own label, no tool access, the configured oracle model and a timeout
//! shorter than the parent invocation. It shares nothing with the parent
//! call except the verdict, which the caller records in the tracker.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{Verdict, VerificationKey};
use crate::domain::ports::{AgentBackend, BackendEvent, InvocationRequest};
use crate::services::session_metrics::SessionMetricsTracker;

/// What the oracle is asked to adjudicate.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub key: VerificationKey,
    pub module_name: String,
    /// Acceptance criteria the work is judged against.
    pub criteria: String,
    /// What the agent claims it did.
    pub evidence: Option<String>,
}

pub struct OracleVerifier {
    backend: Arc<dyn AgentBackend>,
    metrics: Arc<SessionMetricsTracker>,
    model: String,
    timeout: Duration,
    event_buffer: usize,
}

impl OracleVerifier {
    pub fn new(
        backend: Arc<dyn AgentBackend>,
        metrics: Arc<SessionMetricsTracker>,
        model: impl Into<String>,
        timeout: Duration,
        event_buffer: usize,
    ) -> Self {
        Self {
            backend,
            metrics,
            model: model.into(),
            timeout,
            event_buffer: event_buffer.max(1),
        }
    }

    /// Run one oracle sub-invocation.
    ///
    /// Only cancellation is an error; backend failures, timeouts and
    /// unparseable answers come back as [`Verdict::Error`].
    pub async fn verify(
        &self,
        request: &OracleRequest,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<Verdict> {
        let token = cancel.child_token();
        let (tx, mut rx) = mpsc::channel(self.event_buffer);
        let invocation = InvocationRequest {
            session_label: format!("oracle:{}", request.key),
            system_prompt: oracle_prompt(request),
            model: self.model.clone(),
            tools: Vec::new(),
        };

        let backend = Arc::clone(&self.backend);
        let invoke_token = token.clone();
        let mut handle =
            tokio::spawn(async move { backend.invoke(invocation, tx, invoke_token).await });

        let metrics = Arc::clone(&self.metrics);
        let consume = async move {
            while let Some(event) = rx.recv().await {
                match event {
                    BackendEvent::Idle { final_message } => return Some(Ok(final_message)),
                    BackendEvent::Error { message } => return Some(Err(message)),
                    BackendEvent::Usage(usage) => metrics.record_usage(usage),
                    BackendEvent::ToolCall(call) => {
                        let _ = call.reply.send(
                            json!({
                                "success": false,
                                "status": "error",
                                "message": "Tools are not available during verification"
                            })
                            .to_string(),
                        );
                    }
                    BackendEvent::Delta(_) | BackendEvent::NativeTool(_) => {}
                }
            }
            None
        };

        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => {
                handle.abort();
                return Err(OrchestratorError::Cancelled);
            }
            result = tokio::time::timeout(self.timeout, consume) => result,
        };

        let final_message = match outcome {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(message))) => {
                warn!(key = %request.key, error = %message, "oracle backend error");
                token.cancel();
                return Ok(Verdict::Error { message });
            }
            Ok(None) => {
                // Stream closed without a terminal event; the invoke result explains why.
                let message = match (&mut handle).await {
                    Ok(Err(err)) => err.to_string(),
                    Ok(Ok(())) => "oracle ended without a verdict".to_string(),
                    Err(join) => join.to_string(),
                };
                warn!(key = %request.key, error = %message, "oracle produced no final message");
                return Ok(Verdict::Error { message });
            }
            Err(_) => {
                token.cancel();
                handle.abort();
                warn!(
                    key = %request.key,
                    timeout_secs = self.timeout.as_secs(),
                    "oracle verification timed out"
                );
                return Ok(Verdict::Error {
                    message: format!(
                        "verification timed out after {}s",
                        self.timeout.as_secs()
                    ),
                });
            }
        };

        let verdict = parse_verdict(&final_message);
        debug!(key = %request.key, verdict = verdict.label(), "oracle verdict parsed");
        Ok(verdict)
    }
}

impl std::fmt::Debug for OracleVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleVerifier")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn oracle_prompt(request: &OracleRequest) -> String {
    let mut prompt = format!(
        "You are an independent verifier. Decide whether {} '{}' of module '{}' is complete.\n\n\
         Acceptance criteria:\n{}\n",
        request.key.scope, request.key.id, request.module_name, request.criteria
    );
    if let Some(evidence) = &request.evidence {
        prompt.push_str("\nClaimed evidence:\n");
        prompt.push_str(evidence);
        prompt.push('\n');
    }
    prompt.push_str(
        "\nAnswer with a JSON object {\"passed\": true|false, \"gaps\": [..]} \
         or a line `VERDICT: PASS` / `VERDICT: FAIL` followed by one `- gap` line per gap.",
    );
    prompt
}

/// Parse a verdict from the oracle's final message.
///
/// Accepts a JSON object with `passed` (and optional `gaps`) anywhere in the
/// text, or a `VERDICT: PASS|FAIL` line.
pub fn parse_verdict(text: &str) -> Verdict {
    if let Some(verdict) = parse_json_verdict(text) {
        return verdict;
    }

    let mut lines = text.lines().map(str::trim);
    while let Some(line) = lines.next() {
        let upper = line.to_ascii_uppercase();
        let Some(value) = upper.strip_prefix("VERDICT:") else {
            continue;
        };
        return match value.trim() {
            "PASS" => Verdict::Pass,
            "FAIL" => Verdict::Fail {
                gaps: lines
                    .filter_map(|l| l.strip_prefix("- "))
                    .map(|gap| gap.trim().to_string())
                    .filter(|gap| !gap.is_empty())
                    .collect(),
            },
            other => Verdict::Error {
                message: format!("unrecognised verdict '{other}'"),
            },
        };
    }

    Verdict::Error {
        message: "oracle answer contained no verdict".to_string(),
    }
}

fn parse_json_verdict(text: &str) -> Option<Verdict> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: Value = serde_json::from_str(&text[start..=end]).ok()?;
    let passed = value.get("passed")?.as_bool()?;
    if passed {
        return Some(Verdict::Pass);
    }
    let gaps = value
        .get("gaps")
        .and_then(Value::as_array)
        .map(|gaps| {
            gaps.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(Verdict::Fail { gaps })
}
