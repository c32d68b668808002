//! Workflow state machine.
//!
//! Owns the single live [`WorkflowPosition`] of a session. `advance` accepts
//! only triggers in [`WorkflowStateMachine::permitted_triggers`]; anything
//! else fails with `InvalidTransition` and leaves the state untouched.
//!
//! Step 7 has the one non-linear edge in the graph: with components
//! remaining, `RepeatComponent` returns to step 4 (components and
//! dependencies are already fixed, so steps 2 and 3 are never revisited).

use std::collections::HashSet;
use tracing::info;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    Phase, Step, Trigger, TriggerKind, WorkflowPosition, WorkflowSnapshot,
};

/// Result of an accepted trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Step,
    pub to: Step,
    pub from_phase: Phase,
    pub to_phase: Phase,
}

impl Transition {
    pub fn phase_changed(&self) -> bool {
        self.from_phase != self.to_phase
    }

    pub fn step_changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowStateMachine {
    state: WorkflowSnapshot,
}

impl WorkflowStateMachine {
    /// Fresh workflow for `module_name`, at step 1.
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            state: WorkflowSnapshot::new(module_name),
        }
    }

    /// Resume from a persisted snapshot.
    pub fn from_snapshot(snapshot: WorkflowSnapshot) -> Self {
        Self { state: snapshot }
    }

    pub fn snapshot(&self) -> &WorkflowSnapshot {
        &self.state
    }

    pub fn position(&self) -> &WorkflowPosition {
        &self.state.position
    }

    pub fn current_phase(&self) -> Phase {
        self.state.position.phase
    }

    pub fn current_step(&self) -> Step {
        self.state.position.step
    }

    pub fn is_complete(&self) -> bool {
        self.state.complete
    }

    pub fn in_research(&self) -> bool {
        self.state.research_return.is_some()
    }

    /// Components still queued after the current one.
    pub fn remaining_components(&self) -> usize {
        self.state.pending_components.len()
    }

    pub fn permitted_triggers(&self) -> HashSet<TriggerKind> {
        use TriggerKind as K;

        if self.state.complete {
            return HashSet::new();
        }
        if self.in_research() {
            return HashSet::from([K::FinishResearch]);
        }

        let position = &self.state.position;
        match position.step {
            Step::GatherRequirements => HashSet::from([K::CompleteRequirements, K::StartResearch]),
            Step::AnalyzeDependencies => HashSet::from([K::CompleteDependencies, K::StartResearch]),
            Step::DefineComponents => HashSet::from([K::DefineComponents, K::StartResearch]),
            Step::PlanComponent => HashSet::from([K::CompletePlan, K::StartResearch]),
            Step::ReviewPlan => HashSet::from([K::ApprovePlan, K::RevisePlan, K::StartResearch]),
            Step::ExecuteTasks => {
                if position.task_name.is_some() {
                    HashSet::from([K::CompleteTask, K::StartResearch])
                } else {
                    HashSet::from([K::StartTask, K::CompleteComponent, K::StartResearch])
                }
            }
            Step::ComponentRepeat => {
                if self.state.pending_components.is_empty() {
                    HashSet::from([K::FinishModule])
                } else {
                    HashSet::from([K::RepeatComponent])
                }
            }
        }
    }

    pub fn can_advance(&self, kind: TriggerKind) -> bool {
        self.permitted_triggers().contains(&kind)
    }

    /// Apply `trigger`. On error the state is unchanged.
    pub fn advance(&mut self, trigger: Trigger) -> OrchestratorResult<Transition> {
        let kind = trigger.kind();
        if !self.can_advance(kind) {
            if self.state.complete {
                return Err(OrchestratorError::WorkflowComplete);
            }
            return Err(OrchestratorError::InvalidTransition {
                from: self.current_step(),
                trigger: kind,
            });
        }

        // Validate payloads before touching anything.
        let components = match &trigger {
            Trigger::DefineComponents { components } => {
                let mut unique: Vec<String> = Vec::with_capacity(components.len());
                for name in components.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
                    if !unique.iter().any(|u| u == name) {
                        unique.push(name.to_string());
                    }
                }
                if unique.is_empty() {
                    return Err(OrchestratorError::InvalidTrigger {
                        trigger: kind,
                        reason: "at least one component is required".to_string(),
                    });
                }
                unique
            }
            Trigger::StartTask { task } if task.trim().is_empty() => {
                return Err(OrchestratorError::InvalidTrigger {
                    trigger: kind,
                    reason: "task name cannot be empty".to_string(),
                });
            }
            _ => Vec::new(),
        };

        let from = self.current_step();
        let from_phase = self.current_phase();
        let state = &mut self.state;

        match trigger {
            Trigger::CompleteRequirements => state.position.step = Step::AnalyzeDependencies,
            Trigger::CompleteDependencies => state.position.step = Step::DefineComponents,
            Trigger::DefineComponents { .. } => {
                let mut queue: std::collections::VecDeque<String> = components.into();
                state.position.component_name = queue.pop_front();
                state.pending_components = queue;
                state.position.step = Step::PlanComponent;
            }
            Trigger::CompletePlan => state.position.step = Step::ReviewPlan,
            Trigger::ApprovePlan => state.position.step = Step::ExecuteTasks,
            Trigger::RevisePlan => state.position.step = Step::PlanComponent,
            Trigger::StartTask { task } => state.position.task_name = Some(task.trim().to_string()),
            Trigger::CompleteTask => state.position.task_name = None,
            Trigger::CompleteComponent => {
                if let Some(component) = state.position.component_name.clone() {
                    state.completed_components.push(component);
                }
                state.position.step = Step::ComponentRepeat;
            }
            Trigger::RepeatComponent => {
                state.position.component_name = state.pending_components.pop_front();
                state.position.task_name = None;
                state.position.step = Step::PlanComponent;
            }
            Trigger::FinishModule => {
                state.position.component_name = None;
                state.position.task_name = None;
                state.complete = true;
            }
            Trigger::StartResearch { topic } => {
                state.research_return = Some(state.position.step);
                state.position.phase = Phase::Research;
                info!(module = %state.position.module_name, topic = %topic, "entering research detour");
            }
            Trigger::FinishResearch => {
                state.research_return = None;
            }
        }

        if state.research_return.is_none() {
            state.position.phase = state.position.step.phase();
        }

        let transition = Transition {
            from,
            to: state.position.step,
            from_phase,
            to_phase: state.position.phase,
        };

        info!(
            module = %state.position.module_name,
            trigger = %kind,
            from_step = from.number(),
            to_step = transition.to.number(),
            phase = %transition.to_phase,
            complete = state.complete,
            "workflow advanced"
        );

        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_at_execute(components: &[&str]) -> WorkflowStateMachine {
        let mut sm = WorkflowStateMachine::new("auth");
        sm.advance(Trigger::CompleteRequirements).unwrap();
        sm.advance(Trigger::CompleteDependencies).unwrap();
        sm.advance(Trigger::DefineComponents {
            components: components.iter().map(|c| (*c).to_string()).collect(),
        })
        .unwrap();
        sm.advance(Trigger::CompletePlan).unwrap();
        sm.advance(Trigger::ApprovePlan).unwrap();
        sm
    }

    #[test]
    fn test_linear_path_to_building() {
        let sm = machine_at_execute(&["login", "session"]);
        assert_eq!(sm.current_step(), Step::ExecuteTasks);
        assert_eq!(sm.current_phase(), Phase::Building);
        assert_eq!(sm.position().component_name.as_deref(), Some("login"));
        assert_eq!(sm.remaining_components(), 1);
    }

    #[test]
    fn test_unpermitted_trigger_leaves_state_unchanged() {
        let mut sm = WorkflowStateMachine::new("auth");
        let before = sm.snapshot().clone();

        let err = sm.advance(Trigger::ApprovePlan).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidTransition {
                from: Step::GatherRequirements,
                trigger: TriggerKind::ApprovePlan
            }
        ));
        assert_eq!(sm.snapshot(), &before);
    }

    #[test]
    fn test_invalid_payload_leaves_state_unchanged() {
        let mut sm = WorkflowStateMachine::new("auth");
        sm.advance(Trigger::CompleteRequirements).unwrap();
        sm.advance(Trigger::CompleteDependencies).unwrap();
        let before = sm.snapshot().clone();

        let err = sm
            .advance(Trigger::DefineComponents {
                components: vec!["  ".to_string()],
            })
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTrigger { .. }));
        assert_eq!(sm.snapshot(), &before);
    }

    #[test]
    fn test_component_repeat_returns_to_step_four() {
        let mut sm = machine_at_execute(&["login", "session"]);
        sm.advance(Trigger::CompleteComponent).unwrap();
        assert_eq!(sm.current_step(), Step::ComponentRepeat);
        assert!(sm.permitted_triggers().contains(&TriggerKind::RepeatComponent));
        assert!(!sm.permitted_triggers().contains(&TriggerKind::FinishModule));

        let transition = sm.advance(Trigger::RepeatComponent).unwrap();
        assert_eq!(transition.to, Step::PlanComponent);
        assert_eq!(sm.current_step().number(), 4);
        assert_eq!(sm.current_phase(), Phase::Planning);
        assert_eq!(sm.position().component_name.as_deref(), Some("session"));
        assert_eq!(sm.snapshot().completed_components, vec!["login"]);
    }

    #[test]
    fn test_last_component_reaches_terminal_state() {
        let mut sm = machine_at_execute(&["login"]);
        sm.advance(Trigger::CompleteComponent).unwrap();
        assert!(!sm.permitted_triggers().contains(&TriggerKind::RepeatComponent));

        sm.advance(Trigger::FinishModule).unwrap();
        assert!(sm.is_complete());
        assert!(sm.permitted_triggers().is_empty());
        assert!(matches!(
            sm.advance(Trigger::CompleteRequirements),
            Err(OrchestratorError::WorkflowComplete)
        ));
    }

    #[test]
    fn test_task_lifecycle_gates_component_completion() {
        let mut sm = machine_at_execute(&["login"]);
        sm.advance(Trigger::StartTask {
            task: "T1".to_string(),
        })
        .unwrap();
        assert!(!sm.can_advance(TriggerKind::CompleteComponent));
        assert!(!sm.can_advance(TriggerKind::StartTask));

        sm.advance(Trigger::CompleteTask).unwrap();
        assert_eq!(sm.position().task_name, None);
        assert!(sm.can_advance(TriggerKind::CompleteComponent));
    }

    #[test]
    fn test_revise_plan_goes_back_to_planning() {
        let mut sm = WorkflowStateMachine::new("auth");
        sm.advance(Trigger::CompleteRequirements).unwrap();
        sm.advance(Trigger::CompleteDependencies).unwrap();
        sm.advance(Trigger::DefineComponents {
            components: vec!["login".to_string()],
        })
        .unwrap();
        sm.advance(Trigger::CompletePlan).unwrap();
        sm.advance(Trigger::RevisePlan).unwrap();
        assert_eq!(sm.current_step(), Step::PlanComponent);
    }

    #[test]
    fn test_research_detour_keeps_step() {
        let mut sm = WorkflowStateMachine::new("auth");
        sm.advance(Trigger::CompleteRequirements).unwrap();

        let transition = sm
            .advance(Trigger::StartResearch {
                topic: "oauth providers".to_string(),
            })
            .unwrap();
        assert!(transition.phase_changed());
        assert!(!transition.step_changed());
        assert_eq!(sm.current_phase(), Phase::Research);
        assert_eq!(sm.permitted_triggers(), HashSet::from([TriggerKind::FinishResearch]));

        sm.advance(Trigger::FinishResearch).unwrap();
        assert_eq!(sm.current_phase(), Phase::Planning);
        assert_eq!(sm.current_step(), Step::AnalyzeDependencies);
    }

    #[test]
    fn test_duplicate_components_are_collapsed() {
        let mut sm = WorkflowStateMachine::new("auth");
        sm.advance(Trigger::CompleteRequirements).unwrap();
        sm.advance(Trigger::CompleteDependencies).unwrap();
        sm.advance(Trigger::DefineComponents {
            components: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        })
        .unwrap();
        assert_eq!(sm.remaining_components(), 1);
    }

    #[test]
    fn test_snapshot_round_trip_resumes_position() {
        let sm = machine_at_execute(&["login", "session"]);
        let json = serde_json::to_string(sm.snapshot()).unwrap();
        let restored = WorkflowStateMachine::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.position(), sm.position());
        assert_eq!(restored.remaining_components(), 1);
    }
}
