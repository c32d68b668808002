//! Conductor CLI entry point.

use clap::Parser;

use conductor::cli::{self, commands, Cli, Commands};
use conductor::infrastructure::config::ConfigLoader;
use conductor::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging follows the project config when it loads; a broken config is
    // reported by the command itself.
    let _logger = ConfigLoader::load_from_dir(&cli.config_dir)
        .ok()
        .and_then(|config| LogConfig::from_settings(&config.logging).ok())
        .and_then(|log_config| LoggerImpl::init(&log_config).ok());

    let result = match cli.command {
        Commands::Config { path } => commands::config::execute(&cli.config_dir, path, cli.json),
        Commands::Tools => commands::tools::execute(cli.json),
        Commands::Steps => commands::steps::execute(&cli.config_dir, cli.json),
    };

    if let Err(err) = result {
        cli::handle_error(err, cli.json);
    }
}
