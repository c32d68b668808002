//! Domain errors for the Conductor orchestration engine.

use thiserror::Error;

use super::models::{Step, TriggerKind};

/// Errors raised by the engine to its caller.
///
/// Guardrail denials and parameter validation failures normally travel
/// in-band as JSON tool results; the `GuardrailDenial` variant exists for
/// the workflow-level completion boundaries the orchestrator gates itself.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid transition from step {from}: trigger '{trigger}' is not permitted")]
    InvalidTransition { from: Step, trigger: TriggerKind },

    #[error("Invalid trigger '{trigger}': {reason}")]
    InvalidTrigger { trigger: TriggerKind, reason: String },

    #[error("Workflow is already complete")]
    WorkflowComplete,

    #[error("Guardrail denied action: {0}")]
    GuardrailDenial(String),

    #[error("Critical error: {0}")]
    CriticalError(String),

    #[error("Model '{requested}' unavailable; candidates tried: {}", .tried.join(", "))]
    ModelUnavailable { requested: String, tried: Vec<String> },

    #[error("Model fallback chain exhausted; candidates tried: {}", .tried.join(", "))]
    FallbackExhausted { tried: Vec<String> },

    #[error("Persisted state is corrupted: {0}")]
    PersistenceCorruption(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Agent backend error: {0}")]
    Backend(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Errors that must halt the workflow and be reported to the operator.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CriticalError(_) | Self::FallbackExhausted { .. } | Self::ModelUnavailable { .. }
        )
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::PersistenceCorruption(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_exhausted_lists_candidates() {
        let err = OrchestratorError::FallbackExhausted {
            tried: vec!["m1".to_string(), "m2".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Model fallback chain exhausted; candidates tried: m1, m2"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = OrchestratorError::InvalidTransition {
            from: Step::GatherRequirements,
            trigger: TriggerKind::FinishModule,
        };
        assert!(err.to_string().contains("finish_module"));
        assert!(!err.is_fatal());
    }
}
