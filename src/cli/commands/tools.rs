//! Implementation of the `conductor tools` command.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::ports::ToolDefinition;
use crate::services::tools::catalog::ToolName;

#[derive(Debug, Serialize)]
pub struct ToolsOutput {
    pub tools: Vec<ToolDefinition>,
}

impl CommandOutput for ToolsOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::with_capacity(self.tools.len());
        for tool in &self.tools {
            let required = tool.parameters["required"]
                .as_array()
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(|f| f.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            lines.push(format!("{:<30} {}", tool.name, tool.description));
            if !required.is_empty() {
                lines.push(format!("{:<30} required: {}", "", required));
            }
        }
        lines.join("\n")
    }
}

pub fn execute(json_mode: bool) -> Result<()> {
    let tools = ToolName::ALL.iter().map(ToolName::definition).collect();
    output(&ToolsOutput { tools }, json_mode);
    Ok(())
}
