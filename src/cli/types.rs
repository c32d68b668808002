//! CLI type definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Conductor - orchestration and guardrails for agent-driven delivery", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Project configuration directory
    #[arg(long, global = true, default_value = ".conductor", env = "CONDUCTOR_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the effective, validated configuration
    Config {
        /// Load this file instead of the configuration directory
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// List the tools offered to the agent with their parameter schemas
    Tools,

    /// Show the workflow steps and the model chain for each phase
    Steps,
}
