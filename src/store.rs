//! Persistence gateway: the insert contract plus an append-only JSON Lines store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::batch::Batch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertReport {
    /// Analyzed documents written as part of the batch.
    pub inserted_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("writing batch to {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing batch")]
    Serialize(#[from] serde_json::Error),
    #[error("store rejected batch: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn insert_batch(&self, batch: &Batch) -> Result<InsertReport, StoreError>;
}

/// One JSON document per line; the file and its parent directories are
/// created on first insert.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl BatchStore for JsonlStore {
    async fn insert_batch(&self, batch: &Batch) -> Result<InsertReport, StoreError> {
        let mut line = serde_json::to_string(batch)?;
        line.push('\n');

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.io_err(e))?;
        }

        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        f.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_err(e))?;
        f.flush().await.map_err(|e| self.io_err(e))?;

        Ok(InsertReport {
            inserted_count: batch.results.len(),
        })
    }
}
