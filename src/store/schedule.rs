//! Schedule storage trait.
//!
//! Defines the interface for persisting schedule definitions.

use async_trait::async_trait;

use crate::scheduler::ScheduleDefinition;

use super::error::StorageResult;

/// Storage interface for schedule definitions.
///
/// Implementations own the persisted representation; the engine keeps its
/// own in-memory cache on top and always writes through this trait before
/// updating the cache.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// List all persisted schedules.
    async fn list(&self) -> StorageResult<Vec<ScheduleDefinition>>;

    /// Load a single schedule by id. Returns `None` if it does not exist.
    async fn load(&self, id: &str) -> StorageResult<Option<ScheduleDefinition>>;

    /// Persist a schedule, replacing any previous version.
    async fn save(&self, schedule: &ScheduleDefinition) -> StorageResult<()>;

    /// Delete a schedule. Deleting a missing schedule is not an error.
    async fn delete(&self, id: &str) -> StorageResult<()>;
}
