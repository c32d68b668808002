//! Workflow position types.
//!
//! The delivery workflow is a fixed seven-step graph:
//!
//! ```text
//! 1 GatherRequirements → 2 AnalyzeDependencies → 3 DefineComponents
//!   → 4 PlanComponent ⇄ 5 ReviewPlan → 6 ExecuteTasks → 7 ComponentRepeat
//!                  ↖─────────────────────────────────────────┘ (components remain)
//! ```
//!
//! Steps collapse into phases; `Research` is a detour phase that can be
//! entered from any step and returns to the phase of the step it left.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Coarse workflow phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    RequirementGathering,
    Planning,
    Building,
    Research,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequirementGathering => "requirement_gathering",
            Self::Planning => "planning",
            Self::Building => "building",
            Self::Research => "research",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the seven ordered workflow steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    GatherRequirements,
    AnalyzeDependencies,
    DefineComponents,
    PlanComponent,
    ReviewPlan,
    ExecuteTasks,
    ComponentRepeat,
}

impl Step {
    /// All steps in workflow order.
    pub const ALL: [Self; 7] = [
        Self::GatherRequirements,
        Self::AnalyzeDependencies,
        Self::DefineComponents,
        Self::PlanComponent,
        Self::ReviewPlan,
        Self::ExecuteTasks,
        Self::ComponentRepeat,
    ];

    /// 1-based step number.
    pub fn number(&self) -> u8 {
        match self {
            Self::GatherRequirements => 1,
            Self::AnalyzeDependencies => 2,
            Self::DefineComponents => 3,
            Self::PlanComponent => 4,
            Self::ReviewPlan => 5,
            Self::ExecuteTasks => 6,
            Self::ComponentRepeat => 7,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.number() == number)
    }

    /// Phase a step belongs to outside of a research detour.
    pub fn phase(&self) -> Phase {
        match self {
            Self::GatherRequirements => Phase::RequirementGathering,
            Self::AnalyzeDependencies
            | Self::DefineComponents
            | Self::PlanComponent
            | Self::ReviewPlan => Phase::Planning,
            Self::ExecuteTasks | Self::ComponentRepeat => Phase::Building,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GatherRequirements => "gather_requirements",
            Self::AnalyzeDependencies => "analyze_dependencies",
            Self::DefineComponents => "define_components",
            Self::PlanComponent => "plan_component",
            Self::ReviewPlan => "review_plan",
            Self::ExecuteTasks => "execute_tasks",
            Self::ComponentRepeat => "component_repeat",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.as_str())
    }
}

/// Where the single live session currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPosition {
    pub phase: Phase,
    pub step: Step,
    pub module_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
}

impl WorkflowPosition {
    /// Position at the very start of a module.
    pub fn start(module_name: impl Into<String>) -> Self {
        Self {
            phase: Phase::RequirementGathering,
            step: Step::GatherRequirements,
            module_name: module_name.into(),
            component_name: None,
            task_name: None,
        }
    }
}

/// Input that asks the state machine to move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum Trigger {
    CompleteRequirements,
    CompleteDependencies,
    /// Fixes the ordered component list for the module.
    DefineComponents { components: Vec<String> },
    CompletePlan,
    ApprovePlan,
    RevisePlan,
    StartTask { task: String },
    CompleteTask,
    CompleteComponent,
    /// Step 7 back-edge to step 4 for the next component.
    RepeatComponent,
    FinishModule,
    StartResearch { topic: String },
    FinishResearch,
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::CompleteRequirements => TriggerKind::CompleteRequirements,
            Self::CompleteDependencies => TriggerKind::CompleteDependencies,
            Self::DefineComponents { .. } => TriggerKind::DefineComponents,
            Self::CompletePlan => TriggerKind::CompletePlan,
            Self::ApprovePlan => TriggerKind::ApprovePlan,
            Self::RevisePlan => TriggerKind::RevisePlan,
            Self::StartTask { .. } => TriggerKind::StartTask,
            Self::CompleteTask => TriggerKind::CompleteTask,
            Self::CompleteComponent => TriggerKind::CompleteComponent,
            Self::RepeatComponent => TriggerKind::RepeatComponent,
            Self::FinishModule => TriggerKind::FinishModule,
            Self::StartResearch { .. } => TriggerKind::StartResearch,
            Self::FinishResearch => TriggerKind::FinishResearch,
        }
    }
}

/// Payload-free discriminant of a [`Trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    CompleteRequirements,
    CompleteDependencies,
    DefineComponents,
    CompletePlan,
    ApprovePlan,
    RevisePlan,
    StartTask,
    CompleteTask,
    CompleteComponent,
    RepeatComponent,
    FinishModule,
    StartResearch,
    FinishResearch,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompleteRequirements => "complete_requirements",
            Self::CompleteDependencies => "complete_dependencies",
            Self::DefineComponents => "define_components",
            Self::CompletePlan => "complete_plan",
            Self::ApprovePlan => "approve_plan",
            Self::RevisePlan => "revise_plan",
            Self::StartTask => "start_task",
            Self::CompleteTask => "complete_task",
            Self::CompleteComponent => "complete_component",
            Self::RepeatComponent => "repeat_component",
            Self::FinishModule => "finish_module",
            Self::StartResearch => "start_research",
            Self::FinishResearch => "finish_research",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full persisted state of the workflow for one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub position: WorkflowPosition,
    /// Components still to be built, current component excluded.
    #[serde(default)]
    pub pending_components: VecDeque<String>,
    #[serde(default)]
    pub completed_components: Vec<String>,
    /// Step the research detour returns to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_return: Option<Step>,
    #[serde(default)]
    pub complete: bool,
}

impl WorkflowSnapshot {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            position: WorkflowPosition::start(module_name),
            pending_components: VecDeque::new(),
            completed_components: Vec::new(),
            research_return: None,
            complete: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_numbers_are_ordered() {
        for (i, step) in Step::ALL.iter().enumerate() {
            assert_eq!(usize::from(step.number()), i + 1);
            assert_eq!(Step::from_number(step.number()), Some(*step));
        }
        assert_eq!(Step::from_number(0), None);
        assert_eq!(Step::from_number(8), None);
    }

    #[test]
    fn test_steps_collapse_into_phases() {
        assert_eq!(Step::GatherRequirements.phase(), Phase::RequirementGathering);
        assert_eq!(Step::AnalyzeDependencies.phase(), Phase::Planning);
        assert_eq!(Step::ReviewPlan.phase(), Phase::Planning);
        assert_eq!(Step::ExecuteTasks.phase(), Phase::Building);
        assert_eq!(Step::ComponentRepeat.phase(), Phase::Building);
    }

    #[test]
    fn test_trigger_serde_uses_tag() {
        let trigger = Trigger::DefineComponents {
            components: vec!["api".to_string()],
        };
        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(json["trigger"], "define_components");
        let back: Trigger = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), TriggerKind::DefineComponents);
    }

    #[test]
    fn test_snapshot_starts_at_step_one() {
        let snapshot = WorkflowSnapshot::new("auth");
        assert_eq!(snapshot.position.step, Step::GatherRequirements);
        assert_eq!(snapshot.position.module_name, "auth");
        assert!(!snapshot.complete);
    }
}
