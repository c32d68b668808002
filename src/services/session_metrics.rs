//! Cumulative session metrics with a restore/save contract.
//!
//! A resumed session must restore its persisted baseline before recording
//! any usage, otherwise the next checkpoint would overwrite history with a
//! smaller value. `resume` does this, treating missing or corrupted
//! persisted metrics as a fresh start.

use chrono::Utc;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{CheckpointReason, SessionMetrics, Usage};
use crate::domain::ports::SessionStore;

#[derive(Debug)]
struct MetricsState {
    metrics: SessionMetrics,
    /// Usage recorded before the first restore.
    recorded_before_restore: SessionMetrics,
    restored: bool,
}

#[derive(Debug)]
pub struct SessionMetricsTracker {
    state: Mutex<MetricsState>,
}

impl SessionMetricsTracker {
    /// Zeroed counters for a brand-new session.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MetricsState {
                metrics: SessionMetrics::zeroed(),
                recorded_before_restore: SessionMetrics::zeroed(),
                restored: false,
            }),
        }
    }

    /// Tracker seeded from the store, or zeroed when nothing usable is stored.
    pub async fn resume(store: &dyn SessionStore, session_id: &str) -> Self {
        let tracker = Self::new();
        match store.load_session_metrics(session_id).await {
            Ok(Some(metrics)) => {
                tracker.restore(
                    metrics.cumulative_input_tokens,
                    metrics.cumulative_output_tokens,
                    metrics.premium_request_count,
                    metrics.iteration_count,
                );
            }
            Ok(None) => {
                info!(session_id = %session_id, "no persisted metrics, starting fresh");
            }
            Err(err) => {
                warn!(
                    session_id = %session_id,
                    error = %err,
                    "persisted metrics unreadable, starting fresh"
                );
            }
        }
        tracker
    }

    /// Set the persisted baseline.
    ///
    /// Usage recorded before the first restore is kept on top of the
    /// baseline so that nothing is lost, and a warning is logged. Later
    /// restores take the baseline as-is, since it already contains that
    /// usage once it has been snapshotted.
    pub fn restore(
        &self,
        cumulative_input: u64,
        cumulative_output: u64,
        premium_count: u64,
        iteration_count: u64,
    ) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let pending = if state.restored {
            SessionMetrics::zeroed()
        } else {
            std::mem::replace(&mut state.recorded_before_restore, SessionMetrics::zeroed())
        };
        state.restored = true;

        if pending.cumulative_input_tokens > 0
            || pending.cumulative_output_tokens > 0
            || pending.premium_request_count > 0
            || pending.iteration_count > 0
        {
            warn!(
                pending_input = pending.cumulative_input_tokens,
                pending_output = pending.cumulative_output_tokens,
                "metrics restored after usage was recorded; keeping recorded usage on top"
            );
        }

        state.metrics = SessionMetrics {
            cumulative_input_tokens: cumulative_input.saturating_add(pending.cumulative_input_tokens),
            cumulative_output_tokens: cumulative_output
                .saturating_add(pending.cumulative_output_tokens),
            premium_request_count: premium_count.saturating_add(pending.premium_request_count),
            iteration_count: iteration_count.saturating_add(pending.iteration_count),
            updated_at: Utc::now(),
        };

        info!(
            input_tokens = state.metrics.cumulative_input_tokens,
            output_tokens = state.metrics.cumulative_output_tokens,
            premium_requests = state.metrics.premium_request_count,
            iterations = state.metrics.iteration_count,
            "session metrics restored"
        );
    }

    /// Add one usage event on top of the current totals.
    pub fn record_usage(&self, usage: Usage) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;
        let now = Utc::now();
        add_usage(&mut state.metrics, &usage, now);
        if !state.restored {
            add_usage(&mut state.recorded_before_restore, &usage, now);
        }
        debug!(
            input = usage.input_tokens,
            output = usage.output_tokens,
            premium = usage.premium_requests,
            total_input = state.metrics.cumulative_input_tokens,
            "usage recorded"
        );
    }

    /// Count one orchestrator iteration; returns the new total.
    pub fn record_iteration(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.metrics.iteration_count = state.metrics.iteration_count.saturating_add(1);
        if !state.restored {
            state.recorded_before_restore.iteration_count =
                state.recorded_before_restore.iteration_count.saturating_add(1);
        }
        state.metrics.updated_at = Utc::now();
        state.metrics.iteration_count
    }

    pub fn snapshot(&self) -> SessionMetrics {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .metrics
            .clone()
    }

    /// Persist the current snapshot.
    pub async fn checkpoint(
        &self,
        store: &dyn SessionStore,
        session_id: &str,
        reason: CheckpointReason,
    ) -> OrchestratorResult<SessionMetrics> {
        let snapshot = self.snapshot();
        store
            .save_session_metrics(session_id, &snapshot)
            .await
            .map_err(|e| OrchestratorError::Storage(e.to_string()))?;
        info!(
            session_id = %session_id,
            reason = %reason,
            input_tokens = snapshot.cumulative_input_tokens,
            output_tokens = snapshot.cumulative_output_tokens,
            premium_requests = snapshot.premium_request_count,
            iterations = snapshot.iteration_count,
            "session metrics checkpointed"
        );
        Ok(snapshot)
    }
}

fn add_usage(metrics: &mut SessionMetrics, usage: &Usage, now: chrono::DateTime<Utc>) {
    metrics.cumulative_input_tokens = metrics.cumulative_input_tokens.saturating_add(usage.input_tokens);
    metrics.cumulative_output_tokens =
        metrics.cumulative_output_tokens.saturating_add(usage.output_tokens);
    metrics.premium_request_count = metrics.premium_request_count.saturating_add(usage.premium_requests);
    metrics.updated_at = now;
}

impl Default for SessionMetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}
