//! Domain layer for the Conductor orchestration engine
//!
//! This module contains core models, the error taxonomy, and the port
//! traits for every external collaborator.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{OrchestratorError, OrchestratorResult};
