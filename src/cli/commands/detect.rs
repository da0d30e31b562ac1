//! Detect command implementation
//!
//! Runs format detection on a file and prints the result without importing.

use crate::formats::{detect, FormatTag};
use clap::Args;
use std::path::Path;

/// Arguments for the detect command
#[derive(Args, Debug)]
pub struct DetectArgs {
    /// File to inspect
    pub file: String,

    /// Ignore the file extension and sniff content only
    #[arg(long)]
    pub content_only: bool,
}

impl DetectArgs {
    /// Execute the detect command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        let path = Path::new(&self.file);
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("failed to read {}: {e}", path.display())
        })?;

        let filename = if self.content_only {
            None
        } else {
            path.file_name().map(|n| n.to_string_lossy().to_string())
        };

        let tag = detect(&content, filename.as_deref());
        println!("{tag}");

        Ok(if tag == FormatTag::Unknown { 4 } else { 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_detect_known_format() {
        let mut file = NamedTempFile::with_suffix(".hl7").unwrap();
        file.write_all(b"MSH|^~\\&|LAB\nPID|1||P1").unwrap();
        file.flush().unwrap();

        let args = DetectArgs {
            file: file.path().to_string_lossy().to_string(),
            content_only: false,
        };
        assert_eq!(args.execute().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_detect_unknown_format() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"nothing recognizable here").unwrap();
        file.flush().unwrap();

        let args = DetectArgs {
            file: file.path().to_string_lossy().to_string(),
            content_only: true,
        };
        assert_eq!(args.execute().await.unwrap(), 4);
    }
}
