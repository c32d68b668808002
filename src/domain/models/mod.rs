pub mod config;
pub mod failure;
pub mod guardrail;
pub mod metrics;
pub mod model_chain;
pub mod verification;
pub mod workflow;

pub use config::{Config, GuardrailsConfig, LoggingConfig, ModelsConfig, WorkflowConfig};
pub use failure::{Classification, FailureAction, Severity};
pub use guardrail::{Decision, GuardrailContext, ProposedAction};
pub use metrics::{CheckpointReason, SessionMetrics, Usage};
pub use model_chain::{ModelFallbackChain, ModelResolution};
pub use verification::{Verdict, VerificationKey, VerificationRecord, VerificationScope};
pub use workflow::{Phase, Step, Trigger, TriggerKind, WorkflowPosition, WorkflowSnapshot};
