//! Service layer: workflow control, guardrails, verification and the
//! per-iteration orchestration loop.

pub mod backend_errors;
pub mod context_assembler;
pub mod failure_classifier;
pub mod guardrails;
pub mod iteration;
pub mod model_selector;
pub mod oracle;
pub mod orchestrator;
pub mod plan;
pub mod session_metrics;
pub mod state_machine;
pub mod tool_dispatcher;
pub mod tools;
pub mod verification_tracker;

pub use context_assembler::DocumentContextAssembler;
pub use failure_classifier::FailureClassifier;
pub use guardrails::{Guardrail, GuardrailPipeline, QualityGateGuardrail, ToolDisciplineGuardrail};
pub use iteration::IterationState;
pub use model_selector::ModelSelector;
pub use oracle::{OracleRequest, OracleVerifier};
pub use orchestrator::{Collaborators, Orchestrator, RunOutcome, StepOutcome};
pub use session_metrics::SessionMetricsTracker;
pub use state_machine::{Transition, WorkflowStateMachine};
pub use tool_dispatcher::{DispatchError, ToolDispatcher};
pub use verification_tracker::VerificationTracker;
