//! Verification verdict records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Granularity of an oracle verdict. Scopes never imply each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationScope {
    Task,
    Component,
    Module,
}

impl VerificationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Component => "component",
            Self::Module => "module",
        }
    }
}

impl fmt::Display for VerificationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key a verdict is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationKey {
    pub scope: VerificationScope,
    pub id: String,
}

impl VerificationKey {
    pub fn new(scope: VerificationScope, id: impl Into<String>) -> Self {
        Self {
            scope,
            id: id.into(),
        }
    }

    pub fn task(id: impl Into<String>) -> Self {
        Self::new(VerificationScope::Task, id)
    }

    pub fn component(id: impl Into<String>) -> Self {
        Self::new(VerificationScope::Component, id)
    }

    pub fn module(id: impl Into<String>) -> Self {
        Self::new(VerificationScope::Module, id)
    }
}

impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.id)
    }
}

/// Latest verdict for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub scope: VerificationScope,
    pub id: String,
    pub passed: bool,
    /// Orchestrator iteration the verdict was logged in.
    pub iteration: u64,
    pub timestamp: DateTime<Utc>,
}

/// Resolved outcome of an oracle sub-invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail { gaps: Vec<String> },
    Error { message: String },
}

impl Verdict {
    /// Label recorded on the verification span.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail { .. } => "fail",
            Self::Error { .. } => "error",
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}
