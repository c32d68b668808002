//! The per-iteration orchestration loop.
//!
//! One call to [`Orchestrator::run_step`] is one fresh-context iteration:
//! pick the iteration's goal from the workflow position, resolve a model,
//! assemble the prompt, invoke the backend and serve its tool calls, then
//! either advance the state machine or classify the failure.
//!
//! Backend events arrive on a bounded channel per invocation. The consuming
//! loop ends on the first `Idle` or `Error` event and is bounded by the
//! invocation timeout and the caller's cancellation token.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    CheckpointReason, Classification, Config, Decision, FailureAction, Phase, ProposedAction,
    SessionMetrics, Step, Trigger, TriggerKind, VerificationKey, WorkflowPosition,
};
use crate::domain::ports::{
    AgentBackend, BackendEvent, CommitAutomation, ContextAssembler, DocumentStore,
    InvocationRequest, SessionStore,
};
use crate::services::backend_errors::BackendErrorKind;
use crate::services::failure_classifier::FailureClassifier;
use crate::services::guardrails::GuardrailPipeline;
use crate::services::iteration::IterationState;
use crate::services::model_selector::ModelSelector;
use crate::services::oracle::OracleVerifier;
use crate::services::plan::Plan;
use crate::services::session_metrics::SessionMetricsTracker;
use crate::services::state_machine::{Transition, WorkflowStateMachine};
use crate::services::tool_dispatcher::{DispatchError, ToolDispatcher};
use crate::services::tools::{register_builtin_tools, ToolContext};
use crate::services::verification_tracker::VerificationTracker;

/// External collaborators the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn AgentBackend>,
    pub sessions: Arc<dyn SessionStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub context: Arc<dyn ContextAssembler>,
    pub commits: Option<Arc<dyn CommitAutomation>>,
}

/// Result of one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The state machine accepted a trigger.
    Advanced(Transition),
    /// Failure below the threshold; run the same goal again.
    Retry(Classification),
    /// Failure at or above the threshold; the operator must step in.
    NeedsOperator(Classification),
    /// The module is built and verified.
    Complete,
}

/// Why [`Orchestrator::run`] stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Complete,
    NeedsOperator(Classification),
}

/// What an iteration is expected to achieve.
#[derive(Debug, Clone, PartialEq, Eq)]
enum IterationGoal {
    /// Planning, requirements or research work closed by a proposed trigger.
    Step,
    Task(String),
    VerifyComponent(String),
    VerifyModule,
}

impl IterationGoal {
    fn focus(&self, position: &WorkflowPosition) -> String {
        match self {
            Self::Step => format!("complete step {}", position.step),
            Self::Task(task) => format!("implement and verify task '{task}'"),
            Self::VerifyComponent(component) => format!(
                "all tasks of component '{component}' are done; call verify_component_completion for '{component}'"
            ),
            Self::VerifyModule => format!(
                "all components are built; call verify_module_completion for module '{}'",
                position.module_name
            ),
        }
    }
}

enum InvocationResult {
    Completed { final_message: String },
    Failed { message: String },
}

enum ConsumeEnd {
    Done(OrchestratorResult<InvocationResult>),
    TimedOut,
    Cancelled,
}

pub struct Orchestrator {
    session_id: String,
    config: Config,
    collaborators: Collaborators,
    machine: WorkflowStateMachine,
    selector: ModelSelector,
    metrics: Arc<SessionMetricsTracker>,
    classifier: Arc<FailureClassifier>,
    tracker: Arc<VerificationTracker>,
    guardrails: GuardrailPipeline,
    tools: Arc<ToolContext>,
    dispatcher: Arc<ToolDispatcher>,
}

impl Orchestrator {
    /// Fresh session for `module_name`.
    pub fn new(
        session_id: impl Into<String>,
        module_name: impl Into<String>,
        config: Config,
        collaborators: Collaborators,
    ) -> Self {
        Self::assemble(
            session_id.into(),
            config,
            collaborators,
            WorkflowStateMachine::new(module_name),
            Arc::new(SessionMetricsTracker::new()),
        )
    }

    /// Resume a persisted session.
    ///
    /// Metrics are restored before anything can record usage. Missing or
    /// corrupted metrics and workflow snapshots are logged and replaced by a
    /// fresh start for `module_name`.
    pub async fn resume(
        session_id: impl Into<String>,
        module_name: impl Into<String>,
        config: Config,
        collaborators: Collaborators,
    ) -> Self {
        let session_id = session_id.into();
        let sessions = Arc::clone(&collaborators.sessions);
        let metrics = SessionMetricsTracker::resume(sessions.as_ref(), &session_id).await;

        let machine = match sessions.load_workflow(&session_id).await {
            Ok(Some(snapshot)) => {
                info!(
                    session_id = %session_id,
                    module = %snapshot.position.module_name,
                    step = snapshot.position.step.number(),
                    "workflow restored"
                );
                WorkflowStateMachine::from_snapshot(snapshot)
            }
            Ok(None) => WorkflowStateMachine::new(module_name),
            Err(err) => {
                warn!(
                    session_id = %session_id,
                    error = %err,
                    "persisted workflow unreadable, starting fresh"
                );
                WorkflowStateMachine::new(module_name)
            }
        };

        Self::assemble(session_id, config, collaborators, machine, Arc::new(metrics))
    }

    fn assemble(
        session_id: String,
        config: Config,
        collaborators: Collaborators,
        machine: WorkflowStateMachine,
        metrics: Arc<SessionMetricsTracker>,
    ) -> Self {
        let tracker = Arc::new(VerificationTracker::new());
        let classifier = Arc::new(FailureClassifier::new(config.workflow.failure_threshold));
        let guardrails =
            GuardrailPipeline::standard(config.guardrails.clone(), Arc::clone(&tracker));
        let selector = ModelSelector::new(config.models.clone(), Arc::clone(&collaborators.backend));
        let oracle = Arc::new(OracleVerifier::new(
            Arc::clone(&collaborators.backend),
            Arc::clone(&metrics),
            config.models.oracle_model.clone(),
            config.workflow.oracle_timeout(),
            config.workflow.event_buffer,
        ));

        let tools = Arc::new(ToolContext::new(
            Arc::clone(&collaborators.documents),
            collaborators.commits.clone(),
            Arc::clone(&tracker),
            Arc::clone(&classifier),
            guardrails.clone(),
            oracle,
            machine.position().clone(),
        ));
        let mut dispatcher = ToolDispatcher::new();
        register_builtin_tools(
            &mut dispatcher,
            &tools,
            config.workflow.commit_on_task_completion,
        );

        Self {
            session_id,
            config,
            collaborators,
            machine,
            selector,
            metrics,
            classifier,
            tracker,
            guardrails,
            tools,
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state_machine(&self) -> &WorkflowStateMachine {
        &self.machine
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.metrics.snapshot()
    }

    pub fn failure_classifier(&self) -> &FailureClassifier {
        &self.classifier
    }

    pub fn verification_tracker(&self) -> &VerificationTracker {
        &self.tracker
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Apply a trigger from outside the loop, e.g. an operator decision.
    pub async fn advance(&mut self, trigger: Trigger) -> OrchestratorResult<Transition> {
        let transition = self.machine.advance(trigger)?;
        self.tools.set_position(self.machine.position().clone());
        self.checkpoint(checkpoint_reason(&transition)).await?;
        Ok(transition)
    }

    /// Persist metrics and workflow position at a user pause.
    pub async fn pause(&self) -> OrchestratorResult<SessionMetrics> {
        self.checkpoint(CheckpointReason::UserPause).await
    }

    /// Drive iterations until the module completes or needs the operator.
    pub async fn run(&mut self, cancel: &CancellationToken) -> OrchestratorResult<RunOutcome> {
        loop {
            match self.run_step(cancel).await? {
                StepOutcome::Complete => return Ok(RunOutcome::Complete),
                StepOutcome::NeedsOperator(classification) => {
                    return Ok(RunOutcome::NeedsOperator(classification))
                }
                StepOutcome::Advanced(_) | StepOutcome::Retry(_) => {}
            }
        }
    }

    /// Run one fresh-context iteration.
    pub async fn run_step(&mut self, cancel: &CancellationToken) -> OrchestratorResult<StepOutcome> {
        if self.machine.is_complete() {
            return Ok(StepOutcome::Complete);
        }
        if cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        // Step 7 with components left needs no agent work.
        if self.machine.current_step() == Step::ComponentRepeat
            && self.machine.can_advance(TriggerKind::RepeatComponent)
        {
            let transition = self.advance(Trigger::RepeatComponent).await?;
            return Ok(StepOutcome::Advanced(transition));
        }

        let goal = self.select_goal().await?;
        let iteration = self.metrics.record_iteration();
        let position = self.machine.position().clone();
        let state = Arc::new(IterationState::new(
            iteration,
            position.module_name.clone(),
            position.task_name.clone(),
        ));
        self.tools.set_position(position.clone());
        self.tools.begin_iteration(Arc::clone(&state));

        info!(
            session_id = %self.session_id,
            module = %position.module_name,
            step = position.step.number(),
            phase = %position.phase,
            iteration,
            goal = ?goal,
            "iteration started"
        );

        let prompt = self
            .collaborators
            .context
            .assemble(&position, &goal.focus(&position))
            .await
            .map_err(|e| OrchestratorError::Storage(format!("context assembly failed: {e}")))?;

        let result = match self
            .invoke_with_fallback(position.phase, &prompt, &state, cancel)
            .await
        {
            Ok(result) => result,
            Err(err) => return Err(self.fail_fatally(err).await),
        };

        let backend_failure = match result {
            InvocationResult::Completed { final_message } => {
                debug!(iteration, chars = final_message.len(), "invocation completed");
                None
            }
            InvocationResult::Failed { message } => Some(message),
        };

        self.conclude(goal, &state, backend_failure).await
    }

    /// Goal for the next iteration; starts the next task when step 6 is idle.
    async fn select_goal(&mut self) -> OrchestratorResult<IterationGoal> {
        if self.machine.in_research() {
            return Ok(IterationGoal::Step);
        }

        match self.machine.current_step() {
            Step::ExecuteTasks => {
                let position = self.machine.position().clone();
                if let Some(task) = position.task_name {
                    return Ok(IterationGoal::Task(task));
                }

                let plan = match self
                    .collaborators
                    .documents
                    .load_plan(&position.module_name)
                    .await
                {
                    Ok(plan) => plan.map(|text| Plan::parse(&text)).unwrap_or_default(),
                    Err(err) => {
                        warn!(module = %position.module_name, error = %err, "plan unreadable, treating as empty");
                        Plan::default()
                    }
                };

                let next = plan
                    .next_open_task(position.component_name.as_deref())
                    .map(|task| task.id.clone());
                match next {
                    Some(task) => {
                        self.machine.advance(Trigger::StartTask { task: task.clone() })?;
                        self.tools.set_position(self.machine.position().clone());
                        Ok(IterationGoal::Task(task))
                    }
                    None => Ok(IterationGoal::VerifyComponent(
                        position.component_name.unwrap_or(position.module_name),
                    )),
                }
            }
            Step::ComponentRepeat => Ok(IterationGoal::VerifyModule),
            _ => Ok(IterationGoal::Step),
        }
    }

    /// Invoke the backend, walking the fallback chain on call-time
    /// "model unavailable" failures.
    async fn invoke_with_fallback(
        &self,
        phase: Phase,
        prompt: &str,
        state: &Arc<IterationState>,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<InvocationResult> {
        let mut excluded: Vec<String> = Vec::new();

        loop {
            let resolution = match self.selector.resolve_excluding(phase, &excluded).await {
                Ok(resolution) => resolution,
                Err(OrchestratorError::ModelUnavailable { tried, .. }) if !excluded.is_empty() => {
                    let mut all = excluded;
                    all.extend(tried);
                    return Err(OrchestratorError::FallbackExhausted { tried: all });
                }
                Err(err) => return Err(err),
            };

            let model = resolution.model;
            match self.invoke_once(&model, prompt, state, cancel).await? {
                InvocationResult::Failed { message } => match BackendErrorKind::classify(&message) {
                    BackendErrorKind::ModelUnavailable => {
                        warn!(
                            model = %model,
                            error = %message,
                            "model unavailable at call time, retrying with next candidate"
                        );
                        excluded.push(model);
                    }
                    BackendErrorKind::Authentication => {
                        self.classifier.record_critical_error(&message);
                        return Err(OrchestratorError::CriticalError(message));
                    }
                    BackendErrorKind::Other => return Ok(InvocationResult::Failed { message }),
                },
                completed @ InvocationResult::Completed { .. } => return Ok(completed),
            }
        }
    }

    async fn invoke_once(
        &self,
        model: &str,
        prompt: &str,
        state: &Arc<IterationState>,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<InvocationResult> {
        let (tx, mut rx) = mpsc::channel(self.config.workflow.event_buffer.max(1));
        let token = cancel.child_token();
        let request = InvocationRequest {
            session_label: self.session_id.clone(),
            system_prompt: prompt.to_string(),
            model: model.to_string(),
            tools: self.dispatcher.definitions(),
        };

        info!(model = %model, iteration = state.iteration(), "invoking backend");
        let backend = Arc::clone(&self.collaborators.backend);
        let invoke_token = token.clone();
        let mut invocation =
            tokio::spawn(async move { backend.invoke(request, tx, invoke_token).await });
        let mut tool_calls: JoinSet<Result<(), DispatchError>> = JoinSet::new();
        let timeout = self.config.workflow.invocation_timeout();
        let deadline = tokio::time::Instant::now() + timeout;

        let end = {
            let consume =
                self.consume_events(&mut rx, &mut tool_calls, &mut invocation, state, &token);
            tokio::select! {
                biased;
                () = cancel.cancelled() => ConsumeEnd::Cancelled,
                result = tokio::time::timeout_at(deadline, consume) => match result {
                    Ok(done) => ConsumeEnd::Done(done),
                    Err(_) => ConsumeEnd::TimedOut,
                },
            }
        };

        match end {
            ConsumeEnd::Done(Ok(result)) => {
                // Let in-flight handlers finish their side effects, within
                // what is left of the invocation timeout.
                let drain = async { while tool_calls.join_next().await.is_some() {} };
                if tokio::time::timeout_at(deadline, drain).await.is_err() {
                    warn!(
                        pending = tool_calls.len(),
                        "tool calls still running at invocation timeout, cancelling"
                    );
                    token.cancel();
                    tool_calls.abort_all();
                }
                invocation.abort();
                Ok(result)
            }
            ConsumeEnd::Done(Err(err)) => {
                token.cancel();
                tool_calls.abort_all();
                invocation.abort();
                Err(err)
            }
            ConsumeEnd::Cancelled => {
                token.cancel();
                tool_calls.abort_all();
                invocation.abort();
                info!(iteration = state.iteration(), "invocation cancelled");
                Err(OrchestratorError::Cancelled)
            }
            ConsumeEnd::TimedOut => {
                token.cancel();
                tool_calls.abort_all();
                invocation.abort();
                warn!(
                    model = %model,
                    timeout_secs = timeout.as_secs(),
                    "invocation timed out"
                );
                Ok(InvocationResult::Failed {
                    message: OrchestratorError::Timeout {
                        seconds: timeout.as_secs(),
                    }
                    .to_string(),
                })
            }
        }
    }

    async fn consume_events(
        &self,
        rx: &mut mpsc::Receiver<BackendEvent>,
        tool_calls: &mut JoinSet<Result<(), DispatchError>>,
        invocation: &mut JoinHandle<anyhow::Result<()>>,
        state: &Arc<IterationState>,
        token: &CancellationToken,
    ) -> OrchestratorResult<InvocationResult> {
        loop {
            tokio::select! {
                Some(joined) = tool_calls.join_next(), if !tool_calls.is_empty() => {
                    if matches!(joined, Ok(Err(DispatchError::Cancelled))) {
                        return Err(OrchestratorError::Cancelled);
                    }
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        // Stream closed without a terminal event.
                        let message = match (&mut *invocation).await {
                            Ok(Ok(())) => "backend ended the invocation without a final message".to_string(),
                            Ok(Err(err)) => err.to_string(),
                            Err(join) => join.to_string(),
                        };
                        return Ok(InvocationResult::Failed { message });
                    };

                    match event {
                        BackendEvent::ToolCall(call) => {
                            let count = state.record_tool_call();
                            debug!(tool = %call.tool_name, call_id = %call.call_id, count, "tool call received");
                            let dispatcher = Arc::clone(&self.dispatcher);
                            let token = token.clone();
                            tool_calls.spawn(async move {
                                let result = dispatcher
                                    .dispatch(&call.tool_name, &call.parameters, &token)
                                    .await?;
                                if call.reply.send(result).is_err() {
                                    debug!(call_id = %call.call_id, "backend dropped tool reply");
                                }
                                Ok(())
                            });
                        }
                        BackendEvent::Usage(usage) => self.metrics.record_usage(usage),
                        BackendEvent::NativeTool(activity) => state.observe(&activity),
                        BackendEvent::Delta(_) => {}
                        BackendEvent::Idle { final_message } => {
                            return Ok(InvocationResult::Completed { final_message });
                        }
                        BackendEvent::Error { message } => {
                            return Ok(InvocationResult::Failed { message });
                        }
                    }
                }
            }
        }
    }

    /// Advance on success or classify the failure.
    async fn conclude(
        &mut self,
        goal: IterationGoal,
        state: &IterationState,
        backend_failure: Option<String>,
    ) -> OrchestratorResult<StepOutcome> {
        let module = self.machine.position().module_name.clone();

        let (trigger, failure_key, failure) = match &goal {
            IterationGoal::Task(task) => {
                if state.completed_tasks().iter().any(|t| t == task) {
                    self.classifier.reset_failure_count(task);
                    (Some(Trigger::CompleteTask), task.clone(), None)
                } else {
                    (None, task.clone(), Some(format!("task '{task}' was not completed")))
                }
            }
            IterationGoal::VerifyComponent(component) => {
                match self.gate(state, VerificationKey::component(component.clone())) {
                    Decision::Allow => (Some(Trigger::CompleteComponent), component.clone(), None),
                    Decision::Deny { reason, .. } => (None, component.clone(), Some(reason)),
                }
            }
            IterationGoal::VerifyModule => {
                match self.gate(state, VerificationKey::module(module.clone())) {
                    Decision::Allow => (Some(Trigger::FinishModule), module.clone(), None),
                    Decision::Deny { reason, .. } => (None, module.clone(), Some(reason)),
                }
            }
            IterationGoal::Step => {
                let proposed = state
                    .proposed_triggers()
                    .into_iter()
                    .find(|t| self.machine.can_advance(t.kind()));
                let key = format!("{}:{}", module, self.machine.current_step().as_str());
                match proposed {
                    Some(trigger) => (Some(trigger), key, None),
                    None => (
                        None,
                        key,
                        Some(format!(
                            "step {} ended without a permitted completion",
                            self.machine.current_step()
                        )),
                    ),
                }
            }
        };

        // A research request overrides an unfinished goal.
        let trigger = trigger.or_else(|| {
            state
                .proposed_triggers()
                .into_iter()
                .find(|t| t.kind() == TriggerKind::StartResearch && self.machine.can_advance(t.kind()))
        });

        if let Some(trigger) = trigger {
            let transition = self.advance(trigger).await?;
            return Ok(StepOutcome::Advanced(transition));
        }

        let message = backend_failure
            .or_else(|| state.failures().pop())
            .or(failure)
            .unwrap_or_else(|| "iteration made no progress".to_string());
        let classification = self.classifier.record_failure(&failure_key, &message);
        self.checkpoint(CheckpointReason::TaskFailure).await?;

        Ok(match classification.action {
            FailureAction::SelfCorrect => StepOutcome::Retry(classification),
            FailureAction::PromptUser | FailureAction::Block => {
                StepOutcome::NeedsOperator(classification)
            }
        })
    }

    /// Completion boundary check for component and module closes.
    fn gate(&self, state: &IterationState, key: VerificationKey) -> Decision {
        let context = state
            .guardrail_context()
            .with_action(ProposedAction::mark_complete("orchestrator", key));
        self.guardrails.evaluate(&context)
    }

    async fn checkpoint(&self, reason: CheckpointReason) -> OrchestratorResult<SessionMetrics> {
        let sessions = self.collaborators.sessions.as_ref();
        let snapshot = self
            .metrics
            .checkpoint(sessions, &self.session_id, reason)
            .await?;
        sessions
            .save_workflow(&self.session_id, self.machine.snapshot())
            .await
            .map_err(|e| OrchestratorError::Storage(e.to_string()))?;
        Ok(snapshot)
    }

    /// Persist what we have before surfacing a fatal or cancelling error.
    async fn fail_fatally(&self, err: OrchestratorError) -> OrchestratorError {
        let reason = if matches!(err, OrchestratorError::Cancelled) {
            CheckpointReason::UserPause
        } else {
            CheckpointReason::TaskFailure
        };
        if let Err(save_err) = self.checkpoint(reason).await {
            warn!(error = %save_err, "checkpoint after error failed");
        }
        if err.is_fatal() {
            warn!(session_id = %self.session_id, error = %err, "workflow halted");
        }
        err
    }
}

fn checkpoint_reason(transition: &Transition) -> CheckpointReason {
    if transition.phase_changed() {
        CheckpointReason::PhaseTransition
    } else {
        CheckpointReason::StepCompleted
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("session_id", &self.session_id)
            .field("position", self.machine.position())
            .finish_non_exhaustive()
    }
}
