// src/results.rs
//! Optional append-only result log: every accepted listing is written as
//! one JSON line to `<dir>/<task_id>.jsonl`, so a finished task leaves an
//! auditable record beyond its counters. A log failure never blocks the
//! pipeline; the worker logs it and moves on.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

use crate::listing::Listing;
use crate::task::TaskId;

#[derive(Debug, Clone)]
pub struct ResultLog {
    dir: PathBuf,
}

impl ResultLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of one task's log file.
    pub fn task_path(&self, task: TaskId) -> PathBuf {
        self.dir.join(format!("{task}.jsonl"))
    }

    /// Append one accepted listing to the task's file.
    pub async fn append(&self, task: TaskId, listing: &Listing) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating result dir {}", self.dir.display()))?;
        let path = self.task_path(task);
        let mut line = serde_json::to_string(listing).context("serializing listing")?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}
