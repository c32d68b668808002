//! The closed set of tools exposed to the agent backend.

use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::domain::models::VerificationScope;
use crate::domain::ports::ToolDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolName {
    ReadSpec,
    ReadResearch,
    ReadPlan,
    UpdateTaskStatus,
    GetCurrentContext,
    LogResearch,
    ReportProgress,
    VerifyTaskCompletion,
    VerifyComponentCompletion,
    VerifyModuleCompletion,
}

struct Param {
    name: &'static str,
    kind: &'static str,
    description: &'static str,
    required: bool,
}

const fn param(
    name: &'static str,
    kind: &'static str,
    description: &'static str,
    required: bool,
) -> Param {
    Param {
        name,
        kind,
        description,
        required,
    }
}

const EVIDENCE: Param = param(
    "evidence",
    "string",
    "What was implemented and how it was tested",
    false,
);

const READ_PARAMS: &[Param] = &[param(
    "module",
    "string",
    "Module name; defaults to the current module",
    false,
)];

const UPDATE_TASK_STATUS_PARAMS: &[Param] = &[
    param("task_id", "string", "Task identifier from the plan", true),
    param("status", "string", "One of: in_progress, complete, failed", true),
    param("notes", "string", "What was done or why it failed", false),
];

const LOG_RESEARCH_PARAMS: &[Param] = &[
    param("topic", "string", "Short research topic", true),
    param("findings", "string", "Findings to record", true),
];

const REPORT_PROGRESS_PARAMS: &[Param] = &[
    param("message", "string", "Progress summary", true),
    param("step_complete", "boolean", "True when the current step is done", false),
    param(
        "components",
        "array",
        "Ordered component names, when defining components",
        false,
    ),
    param("decision", "string", "Plan review decision: approve or revise", false),
    param(
        "research_topic",
        "string",
        "Topic that needs research before work can continue",
        false,
    ),
];

const VERIFY_TASK_PARAMS: &[Param] = &[
    param("task_id", "string", "Task identifier from the plan", true),
    EVIDENCE,
];

const VERIFY_COMPONENT_PARAMS: &[Param] = &[
    param("component_name", "string", "Component to verify", true),
    EVIDENCE,
];

const VERIFY_MODULE_PARAMS: &[Param] = &[
    param(
        "module_name",
        "string",
        "Module to verify; defaults to the current module",
        false,
    ),
    EVIDENCE,
];

impl ToolName {
    pub const ALL: [Self; 10] = [
        Self::ReadSpec,
        Self::ReadResearch,
        Self::ReadPlan,
        Self::UpdateTaskStatus,
        Self::GetCurrentContext,
        Self::LogResearch,
        Self::ReportProgress,
        Self::VerifyTaskCompletion,
        Self::VerifyComponentCompletion,
        Self::VerifyModuleCompletion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadSpec => "read_spec",
            Self::ReadResearch => "read_research",
            Self::ReadPlan => "read_plan",
            Self::UpdateTaskStatus => "update_task_status",
            Self::GetCurrentContext => "get_current_context",
            Self::LogResearch => "log_research",
            Self::ReportProgress => "report_progress",
            Self::VerifyTaskCompletion => "verify_task_completion",
            Self::VerifyComponentCompletion => "verify_component_completion",
            Self::VerifyModuleCompletion => "verify_module_completion",
        }
    }

    /// Scope adjudicated by a verification tool.
    pub fn verification_scope(&self) -> Option<VerificationScope> {
        match self {
            Self::VerifyTaskCompletion => Some(VerificationScope::Task),
            Self::VerifyComponentCompletion => Some(VerificationScope::Component),
            Self::VerifyModuleCompletion => Some(VerificationScope::Module),
            _ => None,
        }
    }

    /// Parameter a malformed payload is interpreted as.
    pub fn primary_field(&self) -> Option<&'static str> {
        match self {
            Self::ReadSpec | Self::ReadResearch | Self::ReadPlan => Some("module"),
            Self::UpdateTaskStatus | Self::VerifyTaskCompletion => Some("task_id"),
            Self::GetCurrentContext => None,
            Self::LogResearch => Some("findings"),
            Self::ReportProgress => Some("message"),
            Self::VerifyComponentCompletion => Some("component_name"),
            Self::VerifyModuleCompletion => Some("module_name"),
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::ReadSpec => "Read the requirements specification of the current module.",
            Self::ReadResearch => "Read research notes logged for the current module.",
            Self::ReadPlan => "Read the markdown implementation plan of the current module.",
            Self::UpdateTaskStatus => {
                "Update a task's status. Marking a task complete requires a passing verify_task_completion in the same iteration."
            }
            Self::GetCurrentContext => {
                "Return the current workflow position: module, phase, step, component and task."
            }
            Self::LogResearch => "Append research findings under a topic for the current module.",
            Self::ReportProgress => {
                "Report progress. Set step_complete when the current step's work is done."
            }
            Self::VerifyTaskCompletion => "Ask an independent verifier whether a task is complete.",
            Self::VerifyComponentCompletion => {
                "Ask an independent verifier whether a component is complete."
            }
            Self::VerifyModuleCompletion => {
                "Ask an independent verifier whether the whole module is complete."
            }
        }
    }

    fn params(&self) -> &'static [Param] {
        match self {
            Self::ReadSpec | Self::ReadResearch | Self::ReadPlan => READ_PARAMS,
            Self::UpdateTaskStatus => UPDATE_TASK_STATUS_PARAMS,
            Self::GetCurrentContext => &[],
            Self::LogResearch => LOG_RESEARCH_PARAMS,
            Self::ReportProgress => REPORT_PROGRESS_PARAMS,
            Self::VerifyTaskCompletion => VERIFY_TASK_PARAMS,
            Self::VerifyComponentCompletion => VERIFY_COMPONENT_PARAMS,
            Self::VerifyModuleCompletion => VERIFY_MODULE_PARAMS,
        }
    }

    pub fn required_fields(&self) -> Vec<&'static str> {
        self.params()
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect()
    }

    /// Definition handed to the backend.
    pub fn definition(&self) -> ToolDefinition {
        let mut properties = Map::new();
        for p in self.params() {
            let mut schema = json!({ "type": p.kind, "description": p.description });
            if p.kind == "array" {
                schema["items"] = json!({ "type": "string" });
            }
            properties.insert(p.name.to_string(), schema);
        }

        ToolDefinition {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            parameters: json!({
                "type": "object",
                "properties": Value::Object(properties),
                "required": self.required_fields(),
            }),
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| format!("Unknown tool: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>(), Ok(tool));
        }
        assert!("delete_everything".parse::<ToolName>().is_err());
    }

    #[test]
    fn test_definition_schema() {
        let def = ToolName::UpdateTaskStatus.definition();
        assert_eq!(def.name, "update_task_status");
        assert_eq!(def.parameters["required"], json!(["task_id", "status"]));
        assert_eq!(def.parameters["properties"]["status"]["type"], "string");

        let progress = ToolName::ReportProgress.definition();
        assert_eq!(
            progress.parameters["properties"]["components"]["items"]["type"],
            "string"
        );
    }

    #[test]
    fn test_primary_field_is_a_declared_parameter() {
        for tool in ToolName::ALL {
            if let Some(field) = tool.primary_field() {
                assert!(
                    tool.definition().parameters["properties"].get(field).is_some(),
                    "{tool} primary field {field} not declared"
                );
            }
        }
    }
}
