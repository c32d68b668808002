//! Implementation of the `conductor steps` command.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{ModelFallbackChain, Phase, Step};
use crate::infrastructure::config::ConfigLoader;

#[derive(Debug, Serialize)]
pub struct StepRow {
    pub number: u8,
    pub name: &'static str,
    pub phase: &'static str,
    pub models: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StepsOutput {
    pub steps: Vec<StepRow>,
    pub research_models: Vec<String>,
    pub oracle_model: String,
}

impl CommandOutput for StepsOutput {
    fn to_human(&self) -> String {
        let mut lines: Vec<String> = self
            .steps
            .iter()
            .map(|s| {
                format!(
                    "{}. {:<24} {:<22} {}",
                    s.number,
                    s.name,
                    s.phase,
                    s.models.join(" -> ")
                )
            })
            .collect();
        lines.push(format!(
            "   {:<24} {:<22} {}",
            "research detour",
            Phase::Research.as_str(),
            self.research_models.join(" -> ")
        ));
        lines.push(format!("\nOracle model: {}", self.oracle_model));
        lines.join("\n")
    }
}

pub fn execute(config_dir: &Path, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load_from_dir(config_dir)?;
    let models = &config.models;
    let chain = |phase: Phase| {
        ModelFallbackChain::build(
            models.model_for(phase),
            &models.fallback_models,
            &models.default_model,
        )
        .candidates
    };

    let steps = Step::ALL
        .iter()
        .map(|step| StepRow {
            number: step.number(),
            name: step.as_str(),
            phase: step.phase().as_str(),
            models: chain(step.phase()),
        })
        .collect();

    output(
        &StepsOutput {
            steps,
            research_models: chain(Phase::Research),
            oracle_model: models.oracle_model.clone(),
        },
        json_mode,
    );
    Ok(())
}
