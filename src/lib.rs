//! Conductor - orchestration and guardrail engine for agent-driven delivery
//!
//! Conductor drives an AI coding agent through a seven-step workflow
//! (requirements, planning, building) one fresh-context iteration at a time,
//! enforcing tool discipline and verification gates on everything the agent
//! tries to mark complete.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Workflow models, error taxonomy and port traits
//! - **Service Layer** (`services`): State machine, guardrails, oracle, tools and the orchestrator
//! - **Infrastructure Layer** (`infrastructure`): Configuration, logging, storage and commit adapters
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use conductor::services::{Collaborators, Orchestrator};
//!
//! let mut orchestrator = Orchestrator::resume("session-1", "auth", config, collaborators).await;
//! let outcome = orchestrator.run(&cancel).await?;
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{OrchestratorError, OrchestratorResult};
pub use domain::models::{Config, Phase, Step, Trigger, WorkflowPosition};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Collaborators, Orchestrator, RunOutcome, StepOutcome};
