//! CLI command implementations.

pub mod config;
pub mod steps;
pub mod tools;
