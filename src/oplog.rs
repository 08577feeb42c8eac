//! Append-only operational log
//!
//! One JSON object per line: `{"timestamp", "source", "message"}`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::Result;

/// File name inside the data directory
pub const OPERATIONAL_LOG: &str = "operational.log";

/// One operational log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub message: String,
}

/// Writer for the operational log
#[derive(Debug, Clone)]
pub struct OperationalLog {
    path: PathBuf,
}

impl OperationalLog {
    /// Log stored as `operational.log` in `data_dir`
    #[must_use]
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(OPERATIONAL_LOG),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or written
    pub async fn append(&self, source: &str, message: &str) -> Result<()> {
        let entry = LogEntry {
            timestamp: Utc::now(),
            source: source.to_string(),
            message: message.to_string(),
        };

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Append one record, logging instead of failing
    pub async fn record(&self, source: &str, message: &str) {
        if let Err(e) = self.append(source, message).await {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write operational log");
        }
    }

    /// Read every record, skipping malformed lines
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read
    pub async fn entries(&self) -> Result<Vec<LogEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}
