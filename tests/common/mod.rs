//! Common test utilities for integration tests
//!
//! Provides a scripted agent backend and fixtures wiring it to the in-memory
//! stores.

#![allow(dead_code)]

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use conductor::domain::models::{Config, Usage, WorkflowPosition};
use conductor::domain::ports::{
    AgentBackend, BackendEvent, InvocationRequest, NativeToolActivity, ToolCallRequest,
};
use conductor::infrastructure::git::RecordingCommitter;
use conductor::infrastructure::storage::InMemorySessionStore;
use conductor::services::tools::{register_builtin_tools, ToolContext};
use conductor::services::{
    Collaborators, DocumentContextAssembler, FailureClassifier, GuardrailPipeline, Orchestrator,
    OracleVerifier, SessionMetricsTracker, ToolDispatcher, VerificationTracker,
};

pub const MODULE: &str = "auth";

pub const SPEC: &str = "# auth\nUsers log in with a password. Passwords are stored hashed.\n";

pub const PLAN: &str = "## Component: login\n- [ ] T1: hash passwords with bcrypt\n";

/// Initialize tracing for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// One thing the scripted agent does during an invocation.
#[derive(Debug, Clone)]
pub enum Action {
    /// Call a tool and wait for its reply.
    Call { tool: &'static str, params: String },
    /// Send a tool call and move on without waiting for the reply.
    Fire { tool: &'static str, params: String },
    Usage(Usage),
    Native(NativeToolActivity),
    /// Terminal `Idle` event.
    Finish(String),
    /// Terminal `Error` event.
    Fail(String),
    /// Return an error from `invoke` without sending anything.
    Reject(String),
    /// Block until cancelled.
    Hang,
}

pub fn call(tool: &'static str, params: Value) -> Action {
    Action::Call {
        tool,
        params: params.to_string(),
    }
}

pub fn fire(tool: &'static str, params: Value) -> Action {
    Action::Fire {
        tool,
        params: params.to_string(),
    }
}

pub fn step_complete() -> Action {
    call(
        "report_progress",
        json!({ "message": "step done", "step_complete": true }),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub model: String,
    pub label: String,
    pub tool_count: usize,
}

/// Agent backend that plays back queued scripts.
///
/// Oracle invocations (label `oracle:*`) are answered from a separate verdict
/// queue and pass by default.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Vec<Action>>>,
    verdicts: Mutex<VecDeque<String>>,
    failing_models: Mutex<HashSet<String>>,
    oracle_hangs: Mutex<bool>,
    invocations: Mutex<Vec<Invocation>>,
    replies: Mutex<Vec<(String, Value)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_script(&self, actions: Vec<Action>) {
        self.scripts.lock().unwrap().push_back(actions);
    }

    pub fn push_verdict(&self, verdict: &str) {
        self.verdicts.lock().unwrap().push_back(verdict.to_string());
    }

    /// Listed as available but rejected at call time.
    pub fn fail_model(&self, model: &str) {
        self.failing_models.lock().unwrap().insert(model.to_string());
    }

    /// Oracle sub-sessions never answer and ignore cancellation.
    pub fn hang_oracle(&self) {
        *self.oracle_hangs.lock().unwrap() = true;
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn agent_invocations(&self) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|i| !i.label.starts_with("oracle:"))
            .collect()
    }

    /// Every tool reply seen so far, parsed.
    pub fn replies(&self) -> Vec<(String, Value)> {
        self.replies.lock().unwrap().clone()
    }

    pub fn replies_for(&self, tool: &str) -> Vec<Value> {
        self.replies()
            .into_iter()
            .filter(|(name, _)| name == tool)
            .map(|(_, reply)| reply)
            .collect()
    }
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    async fn invoke(
        &self,
        request: InvocationRequest,
        events: mpsc::Sender<BackendEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        self.invocations.lock().unwrap().push(Invocation {
            model: request.model.clone(),
            label: request.session_label.clone(),
            tool_count: request.tools.len(),
        });

        if request.session_label.starts_with("oracle:") {
            if *self.oracle_hangs.lock().unwrap() {
                std::future::pending::<()>().await;
            }
            let verdict = self
                .verdicts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "VERDICT: PASS".to_string());
            events.send(BackendEvent::Usage(Usage::new(5, 1, 0))).await?;
            events
                .send(BackendEvent::Idle {
                    final_message: verdict,
                })
                .await?;
            return Ok(());
        }

        if self.failing_models.lock().unwrap().contains(&request.model) {
            bail!("model '{}' is not available", request.model);
        }

        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        for (index, action) in script.into_iter().enumerate() {
            match action {
                Action::Call { tool, params } => {
                    let (reply, rx) = oneshot::channel();
                    events
                        .send(BackendEvent::ToolCall(ToolCallRequest {
                            call_id: format!("call-{index}"),
                            tool_name: tool.to_string(),
                            parameters: params,
                            reply,
                        }))
                        .await?;
                    let raw = rx.await.map_err(|_| anyhow!("tool reply dropped"))?;
                    let parsed: Value = serde_json::from_str(&raw)?;
                    self.replies.lock().unwrap().push((tool.to_string(), parsed));
                }
                Action::Fire { tool, params } => {
                    let (reply, _rx) = oneshot::channel();
                    events
                        .send(BackendEvent::ToolCall(ToolCallRequest {
                            call_id: format!("call-{index}"),
                            tool_name: tool.to_string(),
                            parameters: params,
                            reply,
                        }))
                        .await?;
                }
                Action::Usage(usage) => events.send(BackendEvent::Usage(usage)).await?,
                Action::Native(activity) => events.send(BackendEvent::NativeTool(activity)).await?,
                Action::Finish(message) => {
                    events
                        .send(BackendEvent::Idle {
                            final_message: message,
                        })
                        .await?;
                    return Ok(());
                }
                Action::Fail(message) => {
                    events.send(BackendEvent::Error { message }).await?;
                    return Ok(());
                }
                Action::Reject(message) => bail!(message),
                Action::Hang => {
                    cancel.cancelled().await;
                    return Ok(());
                }
            }
        }

        events
            .send(BackendEvent::Idle {
                final_message: "done".to_string(),
            })
            .await?;
        Ok(())
    }

    async fn available_models(&self) -> anyhow::Result<Vec<String>> {
        Ok(["sonnet", "opus", "haiku", "m1", "m2", "m3"]
            .iter()
            .map(|m| (*m).to_string())
            .collect())
    }
}

/// Stores, backend and config for one test.
pub struct Fixture {
    pub store: Arc<InMemorySessionStore>,
    pub backend: Arc<ScriptedBackend>,
    pub commits: Arc<RecordingCommitter>,
    pub config: Config,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(InMemorySessionStore::new());
        store.seed_spec(MODULE, SPEC);
        store.seed_plan(MODULE, PLAN);

        let mut config = Config::default();
        config.workflow.invocation_timeout_secs = 5;
        config.workflow.oracle_timeout_secs = 5;

        Self {
            store,
            backend: Arc::new(ScriptedBackend::new()),
            commits: Arc::new(RecordingCommitter::new()),
            config,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            backend: self.backend.clone(),
            sessions: self.store.clone(),
            documents: self.store.clone(),
            context: Arc::new(DocumentContextAssembler::new(self.store.clone())),
            commits: Some(self.commits.clone()),
        }
    }

    pub fn orchestrator(&self, session_id: &str) -> Orchestrator {
        Orchestrator::new(session_id, MODULE, self.config.clone(), self.collaborators())
    }

    pub async fn resume(&self, session_id: &str) -> Orchestrator {
        Orchestrator::resume(session_id, MODULE, self.config.clone(), self.collaborators()).await
    }

    /// Tool context and dispatcher outside any orchestrator.
    pub fn tool_harness(&self, position: WorkflowPosition) -> ToolHarness {
        let tracker = Arc::new(VerificationTracker::new());
        let classifier = Arc::new(FailureClassifier::new(self.config.workflow.failure_threshold));
        let metrics = Arc::new(SessionMetricsTracker::new());
        let oracle = Arc::new(OracleVerifier::new(
            self.backend.clone(),
            Arc::clone(&metrics),
            "haiku",
            Duration::from_secs(5),
            8,
        ));
        let context = Arc::new(ToolContext::new(
            self.store.clone(),
            Some(self.commits.clone()),
            Arc::clone(&tracker),
            classifier,
            GuardrailPipeline::standard(self.config.guardrails.clone(), Arc::clone(&tracker)),
            oracle,
            position,
        ));
        let mut dispatcher = ToolDispatcher::new();
        register_builtin_tools(&mut dispatcher, &context, true);

        ToolHarness {
            context,
            dispatcher,
            tracker,
            metrics,
        }
    }
}

pub struct ToolHarness {
    pub context: Arc<ToolContext>,
    pub dispatcher: ToolDispatcher,
    pub tracker: Arc<VerificationTracker>,
    pub metrics: Arc<SessionMetricsTracker>,
}

impl ToolHarness {
    pub async fn dispatch(&self, tool: &str, params: Value) -> Value {
        let raw = self
            .dispatcher
            .dispatch(tool, &params.to_string(), &CancellationToken::new())
            .await
            .expect("dispatch cancelled");
        serde_json::from_str(&raw).expect("tool reply is JSON")
    }
}
