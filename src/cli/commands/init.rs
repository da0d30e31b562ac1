//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "intake.toml")]
    pub output: String,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing intake configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2); // Configuration error exit code
        }

        match fs::write(&self.output, Self::generate_config()) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your settings", self.output);
                println!("  2. Validate configuration: intake validate-config");
                println!("  3. Import a file: intake import <file>");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(5) // Fatal error exit code
            }
        }
    }

    /// Generate the sample configuration
    fn generate_config() -> String {
        r#"# intake Configuration File
# Clinical data import and reconciliation tool

[application]
name = "intake"

# Log level (trace, debug, info, warn, error)
log_level = "info"

[import]
# Duplicate policy when an incoming patient code already exists:
#   skip   - leave the existing record untouched (default)
#   update - merge incoming non-null fields onto the existing record
#   error  - abort the whole import
duplicate_strategy = "skip"

# Reject files above this size before parsing (default 32 MiB)
max_file_size_bytes = 33554432

# Record validation level (only strict is supported)
validation_level = "strict"

# Run the full pipeline without writing anything
dry_run = false

[logging]
# Write JSON logs to a local rotating file
local_enabled = false
local_path = "logs"

# Rotation schedule (daily or hourly)
local_rotation = "daily"
"#
        .to_string()
    }
}
