//! In-memory cache for schedules with persistence.
//!
//! Wraps a `ScheduleStore` trait implementation with in-memory caching so
//! lookups and listings never touch disk on the hot path.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::error::{Result, SchedulerError};
use super::schedule::{ScheduleDefinition, ScheduleId};
use crate::store::ScheduleStore;

/// In-memory cache over the schedule store.
///
/// Writes go to disk first on create so a schedule is never observable in
/// memory without surviving a restart; updates mutate the cache under the
/// lock and persist after.
#[derive(Clone)]
pub struct ScheduleCache {
    schedules: Arc<RwLock<HashMap<ScheduleId, ScheduleDefinition>>>,
    persistence: Arc<dyn ScheduleStore>,
}

impl ScheduleCache {
    pub fn new(persistence: Arc<dyn ScheduleStore>) -> Self {
        Self {
            schedules: Arc::new(RwLock::new(HashMap::new())),
            persistence,
        }
    }

    /// Load all schedules from disk.
    ///
    /// Call this on startup to restore persisted schedules. Returns the
    /// number of schedules loaded; unreadable files are skipped by the
    /// store with a warning.
    pub async fn load(&self) -> Result<usize> {
        let schedules = self.persistence.list().await?;

        let mut cached = self.schedules.write().await;
        let loaded = schedules.len();
        for schedule in schedules {
            cached.insert(schedule.id.clone(), schedule);
        }

        if loaded > 0 {
            info!(loaded, "Loaded schedules");
        }
        Ok(loaded)
    }

    /// Persist and cache a new schedule.
    pub async fn create(&self, schedule: ScheduleDefinition) -> Result<()> {
        let id = schedule.id.clone();

        // Persist to disk first
        self.persistence.save(&schedule).await?;

        let mut cached = self.schedules.write().await;
        cached.insert(id.clone(), schedule);

        debug!(schedule_id = %id, "Created schedule");
        Ok(())
    }

    /// Get a schedule by ID.
    pub async fn get(&self, id: &str) -> Option<ScheduleDefinition> {
        self.schedules.read().await.get(id).cloned()
    }

    /// List schedules, optionally restricted to one owner, oldest first.
    pub async fn list(&self, owner: Option<&str>) -> Vec<ScheduleDefinition> {
        let cached = self.schedules.read().await;
        let mut schedules: Vec<ScheduleDefinition> = cached
            .values()
            .filter(|s| owner.is_none_or(|o| s.owner.as_deref() == Some(o)))
            .cloned()
            .collect();
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        schedules
    }

    /// List schedules that are enabled and should have an armed trigger.
    pub async fn list_enabled(&self) -> Vec<ScheduleDefinition> {
        let cached = self.schedules.read().await;
        cached.values().filter(|s| s.enabled).cloned().collect()
    }

    /// Atomically update a schedule and persist the result.
    ///
    /// The closure runs with the write lock held, which prevents
    /// read-modify-write races between the service loop and executors. The
    /// lock is released before the disk write.
    pub async fn update_atomically<F>(&self, id: &str, f: F) -> Result<ScheduleDefinition>
    where
        F: FnOnce(&mut ScheduleDefinition),
    {
        let updated = {
            let mut cached = self.schedules.write().await;
            let schedule = cached
                .get_mut(id)
                .ok_or_else(|| SchedulerError::ScheduleNotFound(id.to_string()))?;
            f(schedule);
            schedule.clone()
        };

        self.persistence.save(&updated).await?;
        Ok(updated)
    }

    /// Delete a schedule from cache and disk.
    ///
    /// Returns whether the schedule existed; deleting an unknown ID is a
    /// no-op.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let existed = {
            let mut cached = self.schedules.write().await;
            cached.remove(id).is_some()
        };

        self.persistence.delete(id).await?;

        if existed {
            debug!(schedule_id = %id, "Deleted schedule");
        }
        Ok(existed)
    }

    pub async fn count(&self) -> usize {
        self.schedules.read().await.len()
    }
}
