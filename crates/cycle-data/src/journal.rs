//! Persistent report sink: an append-only text log plus the SQLite journal.

use eyre::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::source::ReportSink;
use crate::store::Store;
use crate::types::{CompletionReport, CycleEvent};

/// Appends report lines to a text file and mirrors them into a [`Store`].
pub struct Journal {
    log_path: PathBuf,
    store: Store,
}

impl Journal {
    /// Creates a journal, making sure the log file's directory exists.
    ///
    /// # Errors
    /// Returns error if the parent directory cannot be created.
    pub async fn open(log_path: &Path, store: Store) -> Result<Self> {
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.wrap_err_with(|| {
                format!("failed to create log directory: {}", parent.display())
            })?;
        }

        Ok(Self {
            log_path: log_path.to_path_buf(),
            store,
        })
    }

    /// Underlying SQLite store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    async fn append_line(&self, line: &str) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .wrap_err_with(|| format!("failed to open log file: {}", self.log_path.display()))?;

        file.write_all(format!("{line}\n").as_bytes())
            .await
            .wrap_err("failed to append to log file")?;
        file.flush().await.wrap_err("failed to flush log file")?;
        Ok(())
    }
}

impl ReportSink for Journal {
    async fn record_event(&self, event: &CycleEvent, line: &str) -> Result<()> {
        self.append_line(line).await?;
        self.store
            .insert_cycle_event(event, line)
            .wrap_err("failed to journal cycle event")
    }

    async fn record_completion(&self, report: &CompletionReport, line: &str) -> Result<()> {
        self.append_line(line).await?;
        self.store
            .insert_completion(report, line)
            .wrap_err("failed to journal completion report")
    }
}
