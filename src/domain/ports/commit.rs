use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of a commit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
}

/// Git automation collaborator, invoked best-effort after an accepted task completion.
#[async_trait]
pub trait CommitAutomation: Send + Sync {
    async fn commit_task_completion(
        &self,
        module: &str,
        component: Option<&str>,
        task_id: &str,
    ) -> Result<CommitOutcome>;
}
