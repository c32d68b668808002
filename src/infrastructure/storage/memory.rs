//! In-memory session and document storage.
//!
//! Values are held as serialized JSON so a stored record can be corrupted
//! on purpose and exercise the same decode path a file-backed store would.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::domain::models::{SessionMetrics, WorkflowSnapshot};
use crate::domain::ports::{DocumentStore, SessionStore};
use crate::services::plan::set_checkbox;

#[derive(Debug, Default)]
struct Documents {
    specs: HashMap<String, String>,
    research: HashMap<String, String>,
    plans: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    metrics: Mutex<HashMap<String, String>>,
    workflows: Mutex<HashMap<String, String>>,
    documents: Mutex<Documents>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw metrics text, bypassing serialization.
    pub fn seed_raw_metrics(&self, session_id: &str, raw: &str) {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_string(), raw.to_string());
    }

    pub fn seed_spec(&self, module: &str, spec: &str) {
        self.docs().specs.insert(module.to_string(), spec.to_string());
    }

    pub fn seed_plan(&self, module: &str, plan: &str) {
        self.docs().plans.insert(module.to_string(), plan.to_string());
    }

    pub fn plan(&self, module: &str) -> Option<String> {
        self.docs().plans.get(module).cloned()
    }

    pub fn research(&self, module: &str) -> Option<String> {
        self.docs().research.get(module).cloned()
    }

    fn docs(&self) -> std::sync::MutexGuard<'_, Documents> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load_session_metrics(&self, session_id: &str) -> Result<Option<SessionMetrics>> {
        let raw = self
            .metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned();
        raw.map(|raw| {
            serde_json::from_str(&raw)
                .with_context(|| format!("corrupted metrics for session {session_id}"))
        })
        .transpose()
    }

    async fn save_session_metrics(&self, session_id: &str, metrics: &SessionMetrics) -> Result<()> {
        let raw = serde_json::to_string(metrics)?;
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_string(), raw);
        debug!(session_id = %session_id, "metrics saved");
        Ok(())
    }

    async fn load_workflow(&self, session_id: &str) -> Result<Option<WorkflowSnapshot>> {
        let raw = self
            .workflows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned();
        raw.map(|raw| {
            serde_json::from_str(&raw)
                .with_context(|| format!("corrupted workflow for session {session_id}"))
        })
        .transpose()
    }

    async fn save_workflow(&self, session_id: &str, snapshot: &WorkflowSnapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot)?;
        self.workflows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_string(), raw);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemorySessionStore {
    async fn load_spec(&self, module: &str) -> Result<Option<String>> {
        Ok(self.docs().specs.get(module).cloned())
    }

    async fn load_research(&self, module: &str) -> Result<Option<String>> {
        Ok(self.docs().research.get(module).cloned())
    }

    async fn append_research(&self, module: &str, topic: &str, findings: &str) -> Result<()> {
        let mut docs = self.docs();
        let notes = docs.research.entry(module.to_string()).or_default();
        if !notes.is_empty() {
            notes.push('\n');
        }
        notes.push_str(&format!("## {topic}\n{findings}\n"));
        Ok(())
    }

    async fn load_plan(&self, module: &str) -> Result<Option<String>> {
        Ok(self.docs().plans.get(module).cloned())
    }

    async fn update_plan_checkbox(&self, module: &str, task: &str, completed: bool) -> Result<()> {
        let mut docs = self.docs();
        let plan = docs
            .plans
            .get_mut(module)
            .ok_or_else(|| anyhow!("no plan for module '{module}'"))?;
        *plan = set_checkbox(plan, task, completed)?;
        Ok(())
    }
}
