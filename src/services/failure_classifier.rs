//! Consecutive-failure tracking and escalation.
//!
//! Streaks are invocation-scoped and never persisted. Below the threshold a
//! task failure is self-corrected inline; at or above it every further
//! failure escalates to the operator until a success or explicit reset
//! clears the streak.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

use crate::domain::models::{Classification, FailureAction, Severity};

/// Default number of consecutive failures before escalation.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug)]
pub struct FailureClassifier {
    threshold: u32,
    counts: Mutex<HashMap<String, u32>>,
}

impl FailureClassifier {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Count a failure of `task_id` and decide how to react.
    pub fn record_failure(&self, task_id: &str, message: &str) -> Classification {
        let count = {
            let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = counts.entry(task_id.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };

        let (severity, action) = if count >= self.threshold {
            (Severity::RepeatedFailure, FailureAction::PromptUser)
        } else {
            (Severity::TaskFailure, FailureAction::SelfCorrect)
        };

        if action == FailureAction::PromptUser {
            warn!(
                task_id = %task_id,
                count,
                threshold = self.threshold,
                message = %message,
                "task keeps failing, escalating to operator"
            );
        } else {
            info!(task_id = %task_id, count, message = %message, "task failed, self-correcting");
        }

        Classification {
            severity,
            action,
            message: message.to_string(),
            task_id: Some(task_id.to_string()),
            count,
        }
    }

    /// A condition that makes further progress unsafe. Never counted.
    pub fn record_critical_error(&self, message: &str) -> Classification {
        error!(message = %message, "critical error, blocking workflow");
        Classification {
            severity: Severity::Critical,
            action: FailureAction::Block,
            message: message.to_string(),
            task_id: None,
            count: 0,
        }
    }

    pub fn record_warning(&self, message: &str) -> Classification {
        warn!(message = %message, "warning classified");
        Classification {
            severity: Severity::Warning,
            action: FailureAction::SelfCorrect,
            message: message.to_string(),
            task_id: None,
            count: 0,
        }
    }

    pub fn reset_failure_count(&self, task_id: &str) {
        let removed = self
            .counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_id);
        if removed.is_some() {
            info!(task_id = %task_id, "failure streak cleared");
        }
    }

    pub fn get_failure_count(&self, task_id: &str) -> u32 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}
