//! File-based schedule storage implementation.
//!
//! Stores schedules as individual YAML files at `{schedules_dir}/{id}.yaml`.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::scheduler::ScheduleDefinition;
use crate::store::error::{StorageError, StorageResult};
use crate::store::schedule::ScheduleStore;

/// File-based implementation of `ScheduleStore`.
///
/// Each schedule is stored as a separate YAML file in the schedules
/// directory. Unreadable files are skipped (with a warning) on `list` so one
/// corrupt document cannot take the whole engine down.
#[derive(Debug, Clone)]
pub struct FileScheduleStore {
    schedules_dir: PathBuf,
}

impl FileScheduleStore {
    /// Create a new file schedule store.
    pub fn new(schedules_dir: impl Into<PathBuf>) -> Self {
        Self {
            schedules_dir: schedules_dir.into(),
        }
    }

    /// Get the file path for a schedule.
    fn schedule_path(&self, id: &str) -> PathBuf {
        self.schedules_dir.join(format!("{}.yaml", id))
    }

    /// Ensure the schedules directory exists.
    async fn ensure_dir(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.schedules_dir)
            .await
            .map_err(|e| StorageError::file_io(&self.schedules_dir, e))
    }
}

#[async_trait]
impl ScheduleStore for FileScheduleStore {
    async fn list(&self) -> StorageResult<Vec<ScheduleDefinition>> {
        let mut schedules = Vec::new();

        let mut entries = match fs::read_dir(&self.schedules_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::file_io(&self.schedules_dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::file_io(&self.schedules_dir, e))?
        {
            let path = entry.path();

            if path.is_dir() {
                continue;
            }
            if path.extension().is_none_or(|ext| ext != "yaml") {
                continue;
            }

            let content = match fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read schedule");
                    continue;
                }
            };

            match serde_saphyr::from_str::<ScheduleDefinition>(&content) {
                Ok(schedule) => schedules.push(schedule),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse schedule");
                    continue;
                }
            }
        }

        Ok(schedules)
    }

    async fn load(&self, id: &str) -> StorageResult<Option<ScheduleDefinition>> {
        let path = self.schedule_path(id);

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::file_io(&path, e)),
        };

        let schedule: ScheduleDefinition = serde_saphyr::from_str(&content)
            .map_err(|e| StorageError::file_deserialization(&path, e.to_string()))?;

        Ok(Some(schedule))
    }

    async fn save(&self, schedule: &ScheduleDefinition) -> StorageResult<()> {
        self.ensure_dir().await?;

        let path = self.schedule_path(&schedule.id);
        let temp_path = path.with_extension("yaml.tmp");

        let content = serde_saphyr::to_string(schedule)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        super::atomic_write_file(&temp_path, &path, content.as_bytes()).await
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.schedule_path(id);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::file_io(&path, e)),
        }
    }
}
