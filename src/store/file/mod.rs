//! File-based storage implementations.
//!
//! Schedules are stored as individual YAML documents, execution records as
//! individual JSON documents. All writes go through a temp file + rename so
//! a crash mid-write can never leave a corrupt document behind.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::error::{StorageError, StorageResult};

mod execution;
mod schedule;

pub use execution::FileExecutionStore;
pub use schedule::FileScheduleStore;

/// Write `contents` to `path` atomically via `temp_path`.
async fn atomic_write_file(temp_path: &Path, path: &Path, contents: &[u8]) -> StorageResult<()> {
    let mut file = fs::File::create(temp_path)
        .await
        .map_err(|e| StorageError::file_io(temp_path, e))?;

    file.write_all(contents)
        .await
        .map_err(|e| StorageError::file_io(temp_path, e))?;

    file.flush()
        .await
        .map_err(|e| StorageError::file_io(temp_path, e))?;

    fs::rename(temp_path, path)
        .await
        .map_err(|e| StorageError::file_io(path, e))?;

    Ok(())
}
