//! Argument parsing for the `conductor` binary.

use clap::Parser;
use std::path::PathBuf;

use conductor::cli::{Cli, Commands};

#[test]
fn test_config_command_with_path() {
    let cli = Cli::try_parse_from(["conductor", "config", "--path", "conf.yaml"]).unwrap();
    match cli.command {
        Commands::Config { path } => assert_eq!(path, Some(PathBuf::from("conf.yaml"))),
        _ => panic!("expected config command"),
    }
    assert!(!cli.json);
    assert_eq!(cli.config_dir, PathBuf::from(".conductor"));
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli =
        Cli::try_parse_from(["conductor", "tools", "--json", "--config-dir", "/tmp/proj"]).unwrap();
    assert!(matches!(cli.command, Commands::Tools));
    assert!(cli.json);
    assert_eq!(cli.config_dir, PathBuf::from("/tmp/proj"));
}

#[test]
fn test_unknown_subcommand_rejected() {
    assert!(Cli::try_parse_from(["conductor", "deploy"]).is_err());
    assert!(Cli::try_parse_from(["conductor"]).is_err());
}
