//! Markdown implementation plans.
//!
//! A plan groups checkbox task lines under component headings:
//!
//! ```text
//! ## Component: login
//! - [ ] T1: hash passwords
//! - [x] T2: session cookie
//! ```
//!
//! The task id is the text before the first `:` on the line, or the whole
//! text when there is no colon.

use thiserror::Error;

const COMPONENT_PREFIX: &str = "## Component:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Task '{0}' not found in plan")]
    TaskNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanTask {
    pub id: String,
    pub text: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanComponent {
    /// Empty for tasks listed before any component heading.
    pub name: String,
    pub tasks: Vec<PlanTask>,
}

impl PlanComponent {
    pub fn next_open_task(&self) -> Option<&PlanTask> {
        self.tasks.iter().find(|t| !t.completed)
    }

    pub fn is_done(&self) -> bool {
        self.tasks.iter().all(|t| t.completed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub components: Vec<PlanComponent>,
}

/// Checkbox line split into (checked, text).
fn parse_checkbox(line: &str) -> Option<(bool, &str)> {
    let rest = line.trim_start().strip_prefix("- [")?;
    let mut chars = rest.chars();
    let mark = chars.next()?;
    let rest = chars.as_str().strip_prefix(']')?;
    let checked = match mark {
        ' ' => false,
        'x' | 'X' => true,
        _ => return None,
    };
    Some((checked, rest.trim()))
}

fn task_id(text: &str) -> &str {
    text.split_once(':').map_or(text, |(id, _)| id).trim()
}

impl Plan {
    pub fn parse(markdown: &str) -> Self {
        let mut components: Vec<PlanComponent> = Vec::new();

        for line in markdown.lines() {
            if let Some(name) = line.trim().strip_prefix(COMPONENT_PREFIX) {
                components.push(PlanComponent {
                    name: name.trim().to_string(),
                    tasks: Vec::new(),
                });
                continue;
            }

            let Some((completed, text)) = parse_checkbox(line) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            if components.is_empty() {
                components.push(PlanComponent {
                    name: String::new(),
                    tasks: Vec::new(),
                });
            }
            if let Some(component) = components.last_mut() {
                component.tasks.push(PlanTask {
                    id: task_id(text).to_string(),
                    text: text.to_string(),
                    completed,
                });
            }
        }

        Self { components }
    }

    pub fn component(&self, name: &str) -> Option<&PlanComponent> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Named component names in plan order.
    pub fn component_names(&self) -> Vec<String> {
        self.components
            .iter()
            .filter(|c| !c.name.is_empty())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Next unchecked task of `component`, or of the whole plan when the
    /// component is unknown.
    pub fn next_open_task(&self, component: Option<&str>) -> Option<&PlanTask> {
        match component.and_then(|name| self.component(name)) {
            Some(component) => component.next_open_task(),
            None => self.components.iter().find_map(PlanComponent::next_open_task),
        }
    }

    pub fn find_task(&self, task: &str) -> Option<&PlanTask> {
        self.components
            .iter()
            .flat_map(|c| c.tasks.iter())
            .find(|t| t.id == task || t.text == task)
    }
}

/// Rewrite the checkbox of the first line whose task id or text matches
/// `task`, leaving every other line untouched.
pub fn set_checkbox(markdown: &str, task: &str, completed: bool) -> Result<String, PlanError> {
    let mut found = false;
    let mut lines: Vec<String> = Vec::new();

    for line in markdown.lines() {
        if !found {
            if let Some((_, text)) = parse_checkbox(line) {
                if task_id(text) == task || text == task {
                    let indent = &line[..line.len() - line.trim_start().len()];
                    let mark = if completed { 'x' } else { ' ' };
                    lines.push(format!("{indent}- [{mark}] {text}"));
                    found = true;
                    continue;
                }
            }
        }
        lines.push(line.to_string());
    }

    if !found {
        return Err(PlanError::TaskNotFound(task.to_string()));
    }

    let mut updated = lines.join("\n");
    if markdown.ends_with('\n') {
        updated.push('\n');
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "# Plan: auth\n\n## Component: login\n- [x] T1: hash passwords\n- [ ] T2: session cookie\n\n## Component: tokens\n- [ ] T3: refresh tokens\n";

    #[test]
    fn test_parse_components_and_tasks() {
        let plan = Plan::parse(PLAN);
        assert_eq!(plan.component_names(), vec!["login", "tokens"]);

        let login = plan.component("login").unwrap();
        assert_eq!(login.tasks.len(), 2);
        assert_eq!(login.tasks[0].id, "T1");
        assert!(login.tasks[0].completed);
        assert_eq!(login.next_open_task().unwrap().id, "T2");
    }

    #[test]
    fn test_next_open_task_without_component() {
        let plan = Plan::parse(PLAN);
        assert_eq!(plan.next_open_task(None).unwrap().id, "T2");
        assert_eq!(plan.next_open_task(Some("tokens")).unwrap().id, "T3");
    }

    #[test]
    fn test_tasks_without_heading() {
        let plan = Plan::parse("- [ ] only task\n");
        assert_eq!(plan.components.len(), 1);
        assert_eq!(plan.components[0].name, "");
        assert_eq!(plan.find_task("only task").unwrap().id, "only task");
    }

    #[test]
    fn test_set_checkbox_by_id() {
        let updated = set_checkbox(PLAN, "T2", true).unwrap();
        assert!(updated.contains("- [x] T2: session cookie"));
        assert!(updated.contains("- [ ] T3: refresh tokens"));
        assert!(updated.ends_with('\n'));

        let reverted = set_checkbox(&updated, "T1", false).unwrap();
        assert!(reverted.contains("- [ ] T1: hash passwords"));
    }

    #[test]
    fn test_set_checkbox_unknown_task() {
        assert_eq!(
            set_checkbox(PLAN, "T9", true),
            Err(PlanError::TaskNotFound("T9".to_string()))
        );
    }
}
