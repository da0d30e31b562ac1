//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for intake using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// intake - clinical data import and reconciliation tool
#[derive(Parser, Debug)]
#[command(name = "intake")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "intake.toml", env = "INTAKE_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "INTAKE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a clinical data file
    Import(commands::import::ImportArgs),

    /// Detect the format of a file without importing it
    Detect(commands::detect::DetectArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_import() {
        let cli = Cli::parse_from(["intake", "import", "cohort.csv"]);
        assert_eq!(cli.config, "intake.toml");
        assert!(matches!(cli.command, Commands::Import(_)));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["intake", "--config", "custom.toml", "import", "a.hl7"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["intake", "--log-level", "debug", "detect", "a.json"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["intake", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["intake", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }

    #[test]
    fn test_cli_parse_import_flags() {
        let cli = Cli::parse_from([
            "intake",
            "import",
            "cohort.csv",
            "--strategy",
            "update",
            "--dry-run",
            "--json",
        ]);
        let Commands::Import(args) = cli.command else {
            panic!("expected import command");
        };
        assert_eq!(args.strategy.as_deref(), Some("update"));
        assert!(args.dry_run);
        assert!(args.json);
    }
}
