//! Inputs and outputs of guardrail evaluation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Action a guardrail is asked to allow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAction {
    /// Tool or workflow trigger that requested the action.
    pub source: String,
    /// Status the action writes, e.g. `complete`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<super::VerificationKey>,
}

impl ProposedAction {
    pub fn tool(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            status: None,
            target: None,
        }
    }

    /// An action that marks `target` as done.
    pub fn mark_complete(source: impl Into<String>, target: super::VerificationKey) -> Self {
        Self {
            source: source.into(),
            status: Some("complete".to_string()),
            target: Some(target),
        }
    }
}

/// Per-iteration view handed to every guardrail. Read-only to guardrails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailContext {
    pub module_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    pub iteration_count: u64,
    pub tool_call_count: u32,
    #[serde(default)]
    pub file_read_counts: HashMap<String, u32>,
    #[serde(default)]
    pub command_retry_counts: HashMap<String, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ProposedAction>,
}

impl GuardrailContext {
    pub fn with_action(mut self, action: ProposedAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Verdict of a single guardrail or of the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { guardrail: String, reason: String },
}

impl Decision {
    pub fn deny(guardrail: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Deny {
            guardrail: guardrail.into(),
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_denied(&self) -> bool {
        !self.is_allowed()
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Deny { reason, .. } => Some(reason),
        }
    }
}
