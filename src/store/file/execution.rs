//! File-based execution record storage implementation.
//!
//! Stores each execution as a JSON file at `{executions_dir}/{id}.json`.
//! Saving the same id again replaces the document, which gives the
//! upsert-in-place semantics the history layer needs when a record moves
//! from `running` to a terminal state.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::scheduler::ExecutionRecord;
use crate::store::error::{StorageError, StorageResult};
use crate::store::execution::ExecutionStore;

/// File-based implementation of `ExecutionStore`.
#[derive(Debug, Clone)]
pub struct FileExecutionStore {
    executions_dir: PathBuf,
}

impl FileExecutionStore {
    /// Create a new file execution store.
    pub fn new(executions_dir: impl Into<PathBuf>) -> Self {
        Self {
            executions_dir: executions_dir.into(),
        }
    }

    /// Get the file path for an execution record.
    fn record_path(&self, id: &str) -> PathBuf {
        self.executions_dir.join(format!("{}.json", id))
    }

    /// Ensure the executions directory exists.
    async fn ensure_dir(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.executions_dir)
            .await
            .map_err(|e| StorageError::file_io(&self.executions_dir, e))
    }
}

#[async_trait]
impl ExecutionStore for FileExecutionStore {
    async fn list(&self) -> StorageResult<Vec<ExecutionRecord>> {
        let mut records = Vec::new();

        let mut entries = match fs::read_dir(&self.executions_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::file_io(&self.executions_dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::file_io(&self.executions_dir, e))?
        {
            let path = entry.path();

            if path.is_dir() {
                continue;
            }
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            let content = match fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read execution record");
                    continue;
                }
            };

            match serde_json::from_str::<ExecutionRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse execution record");
                    continue;
                }
            }
        }

        Ok(records)
    }

    async fn load(&self, id: &str) -> StorageResult<Option<ExecutionRecord>> {
        let path = self.record_path(id);

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::file_io(&path, e)),
        };

        let record: ExecutionRecord = serde_json::from_str(&content)
            .map_err(|e| StorageError::file_deserialization(&path, e.to_string()))?;

        Ok(Some(record))
    }

    async fn save(&self, record: &ExecutionRecord) -> StorageResult<()> {
        self.ensure_dir().await?;

        let path = self.record_path(&record.id);
        let temp_path = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        super::atomic_write_file(&temp_path, &path, content.as_bytes()).await
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.record_path(id);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::file_io(&path, e)),
        }
    }
}
