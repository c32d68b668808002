use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::WorkflowPosition;

/// Builds the system prompt for a fresh-context invocation.
#[async_trait]
pub trait ContextAssembler: Send + Sync {
    /// Prompt content for the step at `position`.
    ///
    /// `focus` names what the iteration is expected to achieve, e.g.
    /// verifying a component before it can be closed.
    async fn assemble(&self, position: &WorkflowPosition, focus: &str) -> Result<String>;
}
