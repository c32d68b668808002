//! Back-pressure guardrails.
//!
//! A guardrail is a pure check over a [`GuardrailContext`]; it holds no
//! mutable state and is safe to share across iterations and sessions. The
//! pipeline runs guardrails in registration order and stops at the first
//! denial.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::models::{
    Decision, GuardrailContext, GuardrailsConfig, ProposedAction, VerificationKey,
    VerificationScope,
};
use crate::services::verification_tracker::VerificationTracker;

/// A single policy check.
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, context: &GuardrailContext) -> Decision;
}

/// Denies unproductive loops: too many tool calls, re-reading one file,
/// retrying one failing command.
#[derive(Debug, Clone)]
pub struct ToolDisciplineGuardrail {
    limits: GuardrailsConfig,
}

impl ToolDisciplineGuardrail {
    pub const NAME: &'static str = "tool_discipline";

    pub fn new(limits: GuardrailsConfig) -> Self {
        Self { limits }
    }

    /// Entry with the highest count above `ceiling`, ties broken by key.
    fn worst_offender<'a>(
        counts: impl Iterator<Item = (&'a String, &'a u32)>,
        ceiling: u32,
    ) -> Option<(&'a String, u32)> {
        counts
            .filter(|(_, count)| **count > ceiling)
            .map(|(key, count)| (key, *count))
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
    }
}

impl Default for ToolDisciplineGuardrail {
    fn default() -> Self {
        Self::new(GuardrailsConfig::default())
    }
}

impl Guardrail for ToolDisciplineGuardrail {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(&self, context: &GuardrailContext) -> Decision {
        if context.tool_call_count > self.limits.max_tool_calls_per_iteration {
            return Decision::deny(
                Self::NAME,
                format!(
                    "Tool call ceiling exceeded: {} calls this iteration (max {}). Stop and summarize progress instead of calling more tools.",
                    context.tool_call_count, self.limits.max_tool_calls_per_iteration
                ),
            );
        }

        if let Some((path, count)) =
            Self::worst_offender(context.file_read_counts.iter(), self.limits.max_file_reads)
        {
            return Decision::deny(
                Self::NAME,
                format!(
                    "File '{}' read {} times this iteration (max {}). Use what you already read.",
                    path, count, self.limits.max_file_reads
                ),
            );
        }

        if let Some((command, count)) = Self::worst_offender(
            context.command_retry_counts.iter(),
            self.limits.max_command_retries,
        ) {
            return Decision::deny(
                Self::NAME,
                format!(
                    "Command '{}' retried {} times this iteration (max {}). Change approach instead of retrying.",
                    command, count, self.limits.max_command_retries
                ),
            );
        }

        Decision::Allow
    }
}

/// Maps a proposed action to the verification key it would close, if any.
pub type CompletionBoundaryFn = Arc<dyn Fn(&ProposedAction) -> Option<VerificationKey> + Send + Sync>;

/// Whether `key` holds a passing verdict logged in the given iteration.
pub type PassingVerificationFn = Arc<dyn Fn(&VerificationKey, u64) -> bool + Send + Sync>;

/// Denies completion-boundary actions unless a passing verdict for the exact
/// (scope, id) was logged in the same iteration.
#[derive(Clone)]
pub struct QualityGateGuardrail {
    is_completion_boundary: CompletionBoundaryFn,
    has_passing_verification: PassingVerificationFn,
}

impl QualityGateGuardrail {
    pub const NAME: &'static str = "quality_gate";

    pub fn new(
        is_completion_boundary: CompletionBoundaryFn,
        has_passing_verification: PassingVerificationFn,
    ) -> Self {
        Self {
            is_completion_boundary,
            has_passing_verification,
        }
    }

    /// Gate backed by a shared tracker, treating any `complete` status with
    /// a target as a completion boundary.
    pub fn with_tracker(tracker: Arc<VerificationTracker>) -> Self {
        Self::new(
            Arc::new(default_completion_boundary),
            Arc::new(move |key, iteration| tracker.passed_in_iteration(key, iteration)),
        )
    }
}

/// Default boundary predicate: status `complete` on a known target.
pub fn default_completion_boundary(action: &ProposedAction) -> Option<VerificationKey> {
    match (action.status.as_deref(), &action.target) {
        (Some(status), Some(target)) if status.eq_ignore_ascii_case("complete") => {
            Some(target.clone())
        }
        _ => None,
    }
}

/// Tool name that produces a verdict for `scope`.
pub fn verification_tool_for(scope: VerificationScope) -> &'static str {
    match scope {
        VerificationScope::Task => "verify_task_completion",
        VerificationScope::Component => "verify_component_completion",
        VerificationScope::Module => "verify_module_completion",
    }
}

impl std::fmt::Debug for QualityGateGuardrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityGateGuardrail").finish_non_exhaustive()
    }
}

impl Guardrail for QualityGateGuardrail {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(&self, context: &GuardrailContext) -> Decision {
        let Some(key) = context
            .action
            .as_ref()
            .and_then(|action| (self.is_completion_boundary)(action))
        else {
            return Decision::Allow;
        };

        if (self.has_passing_verification)(&key, context.iteration_count) {
            return Decision::Allow;
        }

        Decision::deny(
            Self::NAME,
            format!(
                "Cannot mark {} '{}' complete: verification must pass first. Call {} for '{}' in this iteration and only mark it complete after it passes.",
                key.scope,
                key.id,
                verification_tool_for(key.scope),
                key.id
            ),
        )
    }
}

/// Ordered, fail-fast guardrail chain.
#[derive(Clone, Default)]
pub struct GuardrailPipeline {
    guardrails: Vec<Arc<dyn Guardrail>>,
}

impl GuardrailPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tool discipline first, then the quality gate.
    pub fn standard(limits: GuardrailsConfig, tracker: Arc<VerificationTracker>) -> Self {
        Self::new()
            .with(ToolDisciplineGuardrail::new(limits))
            .with(QualityGateGuardrail::with_tracker(tracker))
    }

    pub fn with(mut self, guardrail: impl Guardrail + 'static) -> Self {
        self.register(Arc::new(guardrail));
        self
    }

    pub fn register(&mut self, guardrail: Arc<dyn Guardrail>) {
        self.guardrails.push(guardrail);
    }

    pub fn len(&self) -> usize {
        self.guardrails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guardrails.is_empty()
    }

    /// First denial in registration order, or `Allow`.
    pub fn evaluate(&self, context: &GuardrailContext) -> Decision {
        for guardrail in &self.guardrails {
            let decision = guardrail.check(context);
            if let Decision::Deny { reason, .. } = &decision {
                warn!(
                    guardrail = guardrail.name(),
                    module = %context.module_name,
                    task = context.task_name.as_deref().unwrap_or("-"),
                    iteration = context.iteration_count,
                    reason = %reason,
                    "guardrail denied action"
                );
                return decision;
            }
        }
        debug!(
            module = %context.module_name,
            iteration = context.iteration_count,
            guardrails = self.guardrails.len(),
            "guardrails passed"
        );
        Decision::Allow
    }
}

impl std::fmt::Debug for GuardrailPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.guardrails.iter().map(|g| g.name()))
            .finish()
    }
}
