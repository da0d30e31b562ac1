//! Import command implementation
//!
//! Reads a file, runs it through the import pipeline against the in-memory
//! store, and prints a summary or the full JSON envelope.
//!
//! Exit codes: 0 when the run was clean, 2 when the run completed with
//! record-level failures, 4 when the run was rejected outright.

use crate::config::{load_config, IntakeConfig};
use crate::core::import::ImportOrchestrator;
use crate::core::options::ImportOptions;
use crate::domain::envelope::{ImportEnvelope, IssueSeverity};
use crate::domain::ids::{PatientCode, VisitHandle};
use crate::store::memory::MemoryStore;
use clap::Args;
use std::path::Path;
use std::sync::Arc;

/// Arguments for the import command
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// File to import
    pub file: String,

    /// Duplicate policy for patients (skip, update, error); overrides config
    #[arg(long)]
    pub strategy: Option<String>,

    /// Import every record under this patient code, ignoring codes in the file
    #[arg(long, value_name = "CODE")]
    pub for_patient: Option<String>,

    /// With --for-patient: attach observations without a visit to this visit label
    #[arg(long, value_name = "LABEL", requires = "for_patient")]
    pub for_visit: Option<String>,

    /// Run the full pipeline without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the full result envelope as JSON
    #[arg(long)]
    pub json: bool,
}

impl ImportArgs {
    /// Execute the import command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = load_optional_config(config_path)?;
        let mut options = config.import_options()?;
        if let Some(strategy) = &self.strategy {
            options.duplicate_strategy = strategy.parse()?;
        }
        if self.dry_run {
            options.dry_run = true;
        }

        let path = Path::new(&self.file);
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("failed to read {}: {e}", path.display())
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string());

        let store = Arc::new(MemoryStore::new());
        let orchestrator = ImportOrchestrator::new(store);

        let envelope = match &self.for_patient {
            Some(code) => {
                let code = PatientCode::new(code).map_err(|e| anyhow::anyhow!(e))?;
                let visit_ref = self.for_visit.as_deref().map(VisitHandle::label);
                orchestrator
                    .import_for_patient(
                        &content,
                        filename.as_deref(),
                        &code,
                        visit_ref.as_ref(),
                        &options,
                    )
                    .await
            }
            None => {
                orchestrator
                    .import_file(&content, filename.as_deref(), &options)
                    .await
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        } else {
            print_summary(&self.file, &envelope, options.dry_run);
        }

        Ok(exit_code(&envelope))
    }
}

fn load_optional_config(config_path: &str) -> anyhow::Result<IntakeConfig> {
    if Path::new(config_path).exists() {
        Ok(load_config(config_path)?)
    } else {
        // No config file is fine for one-shot imports; defaults apply.
        Ok(IntakeConfig::default())
    }
}

fn exit_code(envelope: &ImportEnvelope) -> i32 {
    if !envelope.success {
        4
    } else if envelope.is_clean() {
        0
    } else {
        2
    }
}

fn print_summary(file: &str, envelope: &ImportEnvelope, dry_run: bool) {
    if dry_run {
        println!("Dry run: nothing was written");
    }
    if !envelope.success {
        println!("❌ Import of {file} was rejected");
    } else if envelope.is_clean() {
        println!("✅ Import of {file} completed");
    } else {
        println!("⚠️  Import of {file} completed with failures");
    }
    println!();
    println!(
        "  Patients:     {} imported, {} duplicates, {} failed",
        envelope.patients.imported, envelope.patients.duplicates, envelope.patients.failed
    );
    println!(
        "  Visits:       {} imported, {} duplicates, {} failed",
        envelope.visits.imported, envelope.visits.duplicates, envelope.visits.failed
    );
    println!(
        "  Observations: {} imported, {} duplicates, {} failed",
        envelope.observations.imported,
        envelope.observations.duplicates,
        envelope.observations.failed
    );
    println!("  Duration:     {} ms", envelope.duration.as_millis());

    if !envelope.issues.is_empty() {
        println!();
        println!("Issues:");
        for issue in &envelope.issues {
            let marker = match issue.severity {
                IssueSeverity::Error => "error",
                IssueSeverity::Warning => "warning",
            };
            println!("  [{marker}] {}: {}", issue.code.as_str(), issue.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::envelope::{ImportIssue, IssueCode};

    #[test]
    fn test_exit_code_clean() {
        assert_eq!(exit_code(&ImportEnvelope::new()), 0);
    }

    #[test]
    fn test_exit_code_partial() {
        let mut envelope = ImportEnvelope::new();
        envelope.observations.failed = 1;
        assert_eq!(exit_code(&envelope), 2);
    }

    #[test]
    fn test_exit_code_rejected() {
        let envelope = ImportEnvelope::rejected(ImportIssue::error(
            IssueCode::UnsupportedFormat,
            "no parser matched",
        ));
        assert_eq!(exit_code(&envelope), 4);
    }

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let config = load_optional_config("definitely-missing.toml").unwrap();
        assert_eq!(config.import.duplicate_strategy, "skip");
    }
}
