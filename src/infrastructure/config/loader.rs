use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid failure_threshold: {0}. Must be at least 1")]
    InvalidFailureThreshold(u32),

    #[error("Invalid {0}: must be greater than 0")]
    ZeroCeiling(&'static str),

    #[error("Invalid {0}: timeout must be greater than 0 seconds")]
    ZeroTimeout(&'static str),

    #[error(
        "Invalid timeouts: oracle_timeout_secs ({0}) must be less than invocation_timeout_secs ({1})"
    )]
    OracleTimeoutTooLong(u64, u64),

    #[error("Invalid event_buffer: {0}. Must be at least 1")]
    InvalidEventBuffer(usize),

    #[error("Default model cannot be empty")]
    EmptyDefaultModel,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

const PHASE_NAMES: [&str; 4] = ["requirement_gathering", "planning", "building", "research"];

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .conductor/config.yaml (project config)
    /// 3. .conductor/local.yaml (project local overrides, optional)
    /// 4. Environment variables (CONDUCTOR_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".conductor")
    }

    /// Same as [`load`](Self::load) with the project directory given explicitly
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("CONDUCTOR_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let workflow = &config.workflow;
        if workflow.failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold(0));
        }
        if workflow.invocation_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("invocation_timeout_secs"));
        }
        if workflow.oracle_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("oracle_timeout_secs"));
        }
        // Oracle calls run nested inside a tool call of the parent invocation
        if workflow.oracle_timeout_secs >= workflow.invocation_timeout_secs {
            return Err(ConfigError::OracleTimeoutTooLong(
                workflow.oracle_timeout_secs,
                workflow.invocation_timeout_secs,
            ));
        }
        if workflow.event_buffer == 0 {
            return Err(ConfigError::InvalidEventBuffer(0));
        }

        let guardrails = &config.guardrails;
        if guardrails.max_tool_calls_per_iteration == 0 {
            return Err(ConfigError::ZeroCeiling("max_tool_calls_per_iteration"));
        }
        if guardrails.max_file_reads == 0 {
            return Err(ConfigError::ZeroCeiling("max_file_reads"));
        }
        if guardrails.max_command_retries == 0 {
            return Err(ConfigError::ZeroCeiling("max_command_retries"));
        }

        let models = &config.models;
        if models.default_model.trim().is_empty() {
            return Err(ConfigError::EmptyDefaultModel);
        }
        if models.oracle_model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "oracle_model cannot be empty".to_string(),
            ));
        }
        for phase in models.phase_models.keys() {
            if !PHASE_NAMES.contains(&phase.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "unknown phase '{phase}' in phase_models"
                )));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(
                config.logging.rotation.clone(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.workflow.failure_threshold, 3);
        assert_eq!(config.guardrails.max_tool_calls_per_iteration, 50);
        assert_eq!(config.models.availability_ttl_secs, 60);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
workflow:
  failure_threshold: 5
  oracle_timeout_secs: 120
guardrails:
  max_file_reads: 8
models:
  default_model: sonnet
  fallback_models: [m2, m3]
  phase_models:
    building: opus
logging:
  level: debug
  format: pretty
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.workflow.failure_threshold, 5);
        assert_eq!(config.workflow.oracle_timeout_secs, 120);
        assert_eq!(config.workflow.invocation_timeout_secs, 1800);
        assert_eq!(config.guardrails.max_file_reads, 8);
        assert_eq!(config.guardrails.max_command_retries, 3);
        assert_eq!(config.models.fallback_models, vec!["m2", "m3"]);
        assert_eq!(config.models.phase_models.get("building").unwrap(), "opus");
        assert_eq!(config.logging.format, "pretty");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_threshold() {
        let mut config = Config::default();
        config.workflow.failure_threshold = 0;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidFailureThreshold(0))
        );
    }

    #[test]
    fn test_validate_oracle_timeout_must_be_shorter() {
        let mut config = Config::default();
        config.workflow.oracle_timeout_secs = 1800;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::OracleTimeoutTooLong(1800, 1800))
        );
    }

    #[test]
    fn test_validate_zero_ceilings() {
        let mut config = Config::default();
        config.guardrails.max_command_retries = 0;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroCeiling("max_command_retries"))
        );
    }

    #[test]
    fn test_validate_empty_default_model() {
        let mut config = Config::default();
        config.models.default_model = "  ".to_string();
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDefaultModel)
        );
    }

    #[test]
    fn test_validate_unknown_phase_model() {
        let mut config = Config::default();
        config
            .models
            .phase_models
            .insert("deploying".to_string(), "opus".to_string());
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ValidationFailed(msg)) if msg.contains("deploying")
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "workflow:\n  failure_threshold: 4\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(
            override_file,
            "workflow:\n  failure_threshold: 6\nlogging:\n  level: debug"
        )
        .unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.workflow.failure_threshold, 6, "Override should win");
        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }
}
