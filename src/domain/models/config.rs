use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::workflow::Phase;

/// Main configuration structure for Conductor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Workflow loop settings
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Back-pressure ceilings
    #[serde(default)]
    pub guardrails: GuardrailsConfig,

    /// Model selection and fallback
    #[serde(default)]
    pub models: ModelsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Workflow loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowConfig {
    /// Consecutive failures before a task is escalated to the operator
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Overall timeout for one backend invocation
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,

    /// Timeout for oracle sub-invocations; must be shorter than the invocation timeout
    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,

    /// Capacity of the per-invocation backend event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Request a commit after every accepted task completion
    #[serde(default = "default_true")]
    pub commit_on_task_completion: bool,
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_invocation_timeout_secs() -> u64 {
    1800
}

const fn default_oracle_timeout_secs() -> u64 {
    300
}

const fn default_event_buffer() -> usize {
    64
}

const fn default_true() -> bool {
    true
}

impl WorkflowConfig {
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            invocation_timeout_secs: default_invocation_timeout_secs(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
            event_buffer: default_event_buffer(),
            commit_on_task_completion: true,
        }
    }
}

/// Ceilings enforced by the tool-discipline guardrail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GuardrailsConfig {
    /// Maximum tool calls in one iteration
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls_per_iteration: u32,

    /// Maximum reads of any single file in one iteration
    #[serde(default = "default_max_file_reads")]
    pub max_file_reads: u32,

    /// Maximum retries of any single failing command in one iteration
    #[serde(default = "default_max_command_retries")]
    pub max_command_retries: u32,
}

const fn default_max_tool_calls() -> u32 {
    50
}

const fn default_max_file_reads() -> u32 {
    5
}

const fn default_max_command_retries() -> u32 {
    3
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            max_tool_calls_per_iteration: default_max_tool_calls(),
            max_file_reads: default_max_file_reads(),
            max_command_retries: default_max_command_retries(),
        }
    }
}

/// Model selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelsConfig {
    /// Last-resort model appended to every chain
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Models tried, in order, after the phase model
    #[serde(default)]
    pub fallback_models: Vec<String>,

    /// Preferred model per phase, keyed by phase name (e.g. `building`)
    #[serde(default)]
    pub phase_models: BTreeMap<String, String>,

    /// Model used for oracle verification sub-invocations
    #[serde(default = "default_oracle_model")]
    pub oracle_model: String,

    /// How long a fetched availability set stays valid
    #[serde(default = "default_availability_ttl_secs")]
    pub availability_ttl_secs: u64,
}

fn default_model() -> String {
    "sonnet".to_string()
}

fn default_oracle_model() -> String {
    "haiku".to_string()
}

const fn default_availability_ttl_secs() -> u64 {
    60
}

impl ModelsConfig {
    /// Configured model for `phase`, falling back to the default model.
    pub fn model_for(&self, phase: Phase) -> &str {
        self.phase_models
            .get(phase.as_str())
            .map_or(self.default_model.as_str(), String::as_str)
    }

    pub fn availability_ttl(&self) -> Duration {
        Duration::from_secs(self.availability_ttl_secs)
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            fallback_models: Vec::new(),
            phase_models: BTreeMap::new(),
            oracle_model: default_oracle_model(),
            availability_ttl_secs: default_availability_ttl_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Also log to stdout when writing files
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// Rotation policy for file output: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: true,
            rotation: default_rotation(),
        }
    }
}
