//! Default prompt assembly from the module's documents.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::domain::models::{Phase, Step, WorkflowPosition};
use crate::domain::ports::{ContextAssembler, DocumentStore};

fn step_guidance(step: Step) -> &'static str {
    match step {
        Step::GatherRequirements => {
            "Gather and clarify the module's requirements. Call report_progress with step_complete=true once they are settled."
        }
        Step::AnalyzeDependencies => {
            "Analyze external and internal dependencies the module needs. Log findings with log_research."
        }
        Step::DefineComponents => {
            "Split the module into ordered components. Report them via report_progress with step_complete=true and components=[...]."
        }
        Step::PlanComponent => {
            "Write the implementation plan for the current component as checkbox tasks under '## Component: <name>'."
        }
        Step::ReviewPlan => {
            "Review the plan. Report decision=approve or decision=revise with step_complete=true."
        }
        Step::ExecuteTasks => {
            "Implement the current task. Call verify_task_completion, then update_task_status with status=complete only after verification passes."
        }
        Step::ComponentRepeat => "Summarize the finished component.",
    }
}

/// Builds the system prompt from spec, plan and research notes.
pub struct DocumentContextAssembler {
    documents: Arc<dyn DocumentStore>,
}

impl DocumentContextAssembler {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl ContextAssembler for DocumentContextAssembler {
    async fn assemble(&self, position: &WorkflowPosition, focus: &str) -> Result<String> {
        let module = position.module_name.as_str();
        let mut prompt = String::new();

        writeln!(
            prompt,
            "Module: {module}\nPhase: {}\nStep: {}",
            position.phase, position.step
        )?;
        if let Some(component) = &position.component_name {
            writeln!(prompt, "Component: {component}")?;
        }
        if let Some(task) = &position.task_name {
            writeln!(prompt, "Task: {task}")?;
        }

        let guidance = if position.phase == Phase::Research {
            "Research the open question, log findings with log_research, then call report_progress with step_complete=true."
        } else {
            step_guidance(position.step)
        };
        writeln!(prompt, "\n{guidance}\nFocus: {focus}")?;

        if let Some(spec) = self.documents.load_spec(module).await? {
            writeln!(prompt, "\n# Specification\n{spec}")?;
        }
        if position.step >= Step::PlanComponent {
            if let Some(plan) = self.documents.load_plan(module).await? {
                writeln!(prompt, "\n# Plan\n{plan}")?;
            }
        }
        if let Some(research) = self.documents.load_research(module).await? {
            writeln!(prompt, "\n# Research\n{research}")?;
        }

        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemorySessionStore;

    #[tokio::test]
    async fn test_prompt_includes_documents_for_step() {
        let store = Arc::new(InMemorySessionStore::new());
        store.seed_spec("auth", "Users log in with passwords.");
        store.seed_plan("auth", "## Component: login\n- [ ] T1: hash passwords\n");
        let assembler = DocumentContextAssembler::new(store);

        let mut position = WorkflowPosition::start("auth");
        let early = assembler.assemble(&position, "requirements").await.unwrap();
        assert!(early.contains("Users log in"));
        assert!(!early.contains("# Plan"));

        position.step = Step::ExecuteTasks;
        position.phase = Phase::Building;
        position.task_name = Some("T1".to_string());
        let building = assembler.assemble(&position, "task T1").await.unwrap();
        assert!(building.contains("# Plan"));
        assert!(building.contains("Task: T1"));
        assert!(building.contains("verify_task_completion"));
    }
}
