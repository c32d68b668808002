//! Implementation of the `conductor config` command.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    pub source: PathBuf,
    pub config: Config,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        let body = serde_yaml::to_string(&self.config)
            .unwrap_or_else(|e| format!("<unprintable configuration: {e}>"));
        format!("# source: {}\n{}", self.source.display(), body)
    }
}

pub fn execute(config_dir: &Path, path: Option<PathBuf>, json_mode: bool) -> Result<()> {
    let (source, config) = match path {
        Some(path) => {
            let config = ConfigLoader::load_from_file(&path)?;
            (path, config)
        }
        None => {
            let config = ConfigLoader::load_from_dir(config_dir)
                .with_context(|| format!("invalid configuration in {}", config_dir.display()))?;
            (config_dir.to_path_buf(), config)
        }
    };

    output(&ConfigOutput { source, config }, json_mode);
    Ok(())
}
