//! Mutable state of one orchestrator iteration.
//!
//! Tool handlers may run concurrently within an iteration, so every counter
//! sits behind one mutex. A fresh `IterationState` is built per iteration and
//! never reused.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::domain::models::{GuardrailContext, Trigger};
use crate::domain::ports::NativeToolActivity;

/// Free-form progress note sent by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub message: String,
    pub step_complete: bool,
}

#[derive(Debug, Default)]
struct Counters {
    tool_call_count: u32,
    file_read_counts: HashMap<String, u32>,
    command_retry_counts: HashMap<String, u32>,
    /// Outcome of the last run of each command.
    last_command_failed: HashMap<String, bool>,
    completed_tasks: Vec<String>,
    proposed_triggers: Vec<Trigger>,
    progress: Vec<ProgressReport>,
    failures: Vec<String>,
}

#[derive(Debug)]
pub struct IterationState {
    iteration: u64,
    module_name: String,
    task_name: Option<String>,
    counters: Mutex<Counters>,
}

impl IterationState {
    pub fn new(iteration: u64, module_name: impl Into<String>, task_name: Option<String>) -> Self {
        Self {
            iteration,
            module_name: module_name.into(),
            task_name,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn task_name(&self) -> Option<&str> {
        self.task_name.as_deref()
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one dispatched tool call; returns the running total.
    pub fn record_tool_call(&self) -> u32 {
        let mut counters = self.counters();
        counters.tool_call_count = counters.tool_call_count.saturating_add(1);
        counters.tool_call_count
    }

    pub fn record_file_read(&self, path: &str) -> u32 {
        let mut counters = self.counters();
        let count = counters.file_read_counts.entry(path.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// A run counts as a retry only when the previous run of the same
    /// command failed.
    pub fn record_command(&self, command: &str, succeeded: bool) -> u32 {
        let mut counters = self.counters();
        let previous_failed = counters
            .last_command_failed
            .insert(command.to_string(), !succeeded)
            .unwrap_or(false);
        let retries = counters
            .command_retry_counts
            .entry(command.to_string())
            .or_insert(0);
        if previous_failed {
            *retries = retries.saturating_add(1);
        }
        *retries
    }

    /// Feed native backend activity into the counters.
    pub fn observe(&self, activity: &NativeToolActivity) {
        match activity {
            NativeToolActivity::FileRead { path } => {
                let count = self.record_file_read(path);
                debug!(path = %path, count, "native file read observed");
            }
            NativeToolActivity::Command { command, succeeded } => {
                let retries = self.record_command(command, *succeeded);
                debug!(command = %command, succeeded, retries, "native command observed");
            }
        }
    }

    pub fn record_completed_task(&self, task_id: &str) {
        self.counters().completed_tasks.push(task_id.to_string());
    }

    pub fn propose_trigger(&self, trigger: Trigger) {
        self.counters().proposed_triggers.push(trigger);
    }

    pub fn record_progress(&self, report: ProgressReport) {
        self.counters().progress.push(report);
    }

    pub fn record_failure(&self, message: impl Into<String>) {
        self.counters().failures.push(message.into());
    }

    pub fn tool_call_count(&self) -> u32 {
        self.counters().tool_call_count
    }

    pub fn completed_tasks(&self) -> Vec<String> {
        self.counters().completed_tasks.clone()
    }

    pub fn proposed_triggers(&self) -> Vec<Trigger> {
        self.counters().proposed_triggers.clone()
    }

    pub fn progress(&self) -> Vec<ProgressReport> {
        self.counters().progress.clone()
    }

    pub fn failures(&self) -> Vec<String> {
        self.counters().failures.clone()
    }

    /// Snapshot for guardrail evaluation.
    pub fn guardrail_context(&self) -> GuardrailContext {
        let counters = self.counters();
        GuardrailContext {
            module_name: self.module_name.clone(),
            task_name: self.task_name.clone(),
            iteration_count: self.iteration,
            tool_call_count: counters.tool_call_count,
            file_read_counts: counters.file_read_counts.clone(),
            command_retry_counts: counters.command_retry_counts.clone(),
            action: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_retries_count_only_after_failure() {
        let state = IterationState::new(1, "auth", None);
        assert_eq!(state.record_command("cargo test", true), 0);
        assert_eq!(state.record_command("cargo test", false), 0);
        assert_eq!(state.record_command("cargo test", false), 1);
        assert_eq!(state.record_command("cargo test", true), 2);
        assert_eq!(state.record_command("cargo test", true), 2);
    }

    #[test]
    fn test_guardrail_context_snapshot() {
        let state = IterationState::new(4, "auth", Some("T1".to_string()));
        state.record_tool_call();
        state.record_tool_call();
        state.observe(&NativeToolActivity::FileRead {
            path: "src/lib.rs".to_string(),
        });
        state.observe(&NativeToolActivity::FileRead {
            path: "src/lib.rs".to_string(),
        });

        let context = state.guardrail_context();
        assert_eq!(context.iteration_count, 4);
        assert_eq!(context.tool_call_count, 2);
        assert_eq!(context.file_read_counts.get("src/lib.rs"), Some(&2));
        assert_eq!(context.task_name.as_deref(), Some("T1"));
        assert!(context.action.is_none());
    }

    #[test]
    fn test_results_accumulate() {
        let state = IterationState::new(1, "auth", None);
        state.record_completed_task("T1");
        state.propose_trigger(Trigger::CompletePlan);
        state.record_failure("tests failed");

        assert_eq!(state.completed_tasks(), vec!["T1".to_string()]);
        assert_eq!(state.proposed_triggers(), vec![Trigger::CompletePlan]);
        assert_eq!(state.failures().len(), 1);
    }
}
