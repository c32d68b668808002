//! Infrastructure layer module
//!
//! Adapters and ambient plumbing:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - In-memory storage for sessions and module documents
//! - Commit automation adapters
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod config;
pub mod git;
pub mod logging;
pub mod storage;
