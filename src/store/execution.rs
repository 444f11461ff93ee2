//! Execution record storage trait.
//!
//! Defines the interface for persisting execution history.

use async_trait::async_trait;

use crate::scheduler::ExecutionRecord;

use super::error::StorageResult;

/// Storage interface for execution records.
///
/// Records are upserted by id: a record is first saved in its `running`
/// state and saved again when it reaches a terminal state.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// List all persisted execution records.
    async fn list(&self) -> StorageResult<Vec<ExecutionRecord>>;

    /// Load a single record by id. Returns `None` if it does not exist.
    async fn load(&self, id: &str) -> StorageResult<Option<ExecutionRecord>>;

    /// Persist a record, replacing any previous version (upsert by id).
    async fn save(&self, record: &ExecutionRecord) -> StorageResult<()>;

    /// Delete a record. Deleting a missing record is not an error.
    async fn delete(&self, id: &str) -> StorageResult<()>;
}
