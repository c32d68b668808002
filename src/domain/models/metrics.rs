//! Session-level usage counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cumulative counters that survive process restarts.
///
/// Across a save → load → accumulate → save cycle every counter is
/// monotonically non-decreasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub cumulative_input_tokens: u64,
    pub cumulative_output_tokens: u64,
    pub premium_request_count: u64,
    pub iteration_count: u64,
    pub updated_at: DateTime<Utc>,
}

impl SessionMetrics {
    pub fn zeroed() -> Self {
        Self {
            cumulative_input_tokens: 0,
            cumulative_output_tokens: 0,
            premium_request_count: 0,
            iteration_count: 0,
            updated_at: Utc::now(),
        }
    }

    /// True when no counter in `self` is below the matching counter in `other`.
    pub fn dominates(&self, other: &Self) -> bool {
        self.cumulative_input_tokens >= other.cumulative_input_tokens
            && self.cumulative_output_tokens >= other.cumulative_output_tokens
            && self.premium_request_count >= other.premium_request_count
            && self.iteration_count >= other.iteration_count
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Usage reported by one backend usage event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub premium_requests: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64, premium_requests: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            premium_requests,
        }
    }
}

/// Boundary at which metrics are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointReason {
    StepCompleted,
    PhaseTransition,
    UserPause,
    TaskFailure,
}

impl CheckpointReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StepCompleted => "step_completed",
            Self::PhaseTransition => "phase_transition",
            Self::UserPause => "user_pause",
            Self::TaskFailure => "task_failure",
        }
    }
}

impl fmt::Display for CheckpointReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
