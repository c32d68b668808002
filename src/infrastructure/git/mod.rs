//! Commit automation adapters.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::info;
use uuid::Uuid;

use crate::domain::ports::{CommitAutomation, CommitOutcome};

/// One requested commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub module: String,
    pub component: Option<String>,
    pub task_id: String,
}

/// Records commit requests instead of touching a repository.
#[derive(Debug, Default)]
pub struct RecordingCommitter {
    requests: Mutex<Vec<CommitRequest>>,
    fail: AtomicBool,
}

impl RecordingCommitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent commits fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<CommitRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CommitAutomation for RecordingCommitter {
    async fn commit_task_completion(
        &self,
        module: &str,
        component: Option<&str>,
        task_id: &str,
    ) -> Result<CommitOutcome> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CommitRequest {
                module: module.to_string(),
                component: component.map(str::to_string),
                task_id: task_id.to_string(),
            });

        if self.fail.load(Ordering::SeqCst) {
            bail!("git commit failed: nothing to commit");
        }

        let hash = Uuid::new_v4().simple().to_string()[..12].to_string();
        info!(module = %module, task_id = %task_id, commit = %hash, "commit recorded");
        Ok(CommitOutcome {
            success: true,
            commit_hash: Some(hash),
        })
    }
}
