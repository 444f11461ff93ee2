//! Execution history and statistics.
//!
//! Thin layer over the `ExecutionStore` that owns the lifecycle of
//! execution records: recording attempts, querying recent runs, computing
//! statistics, retention cleanup, and startup recovery of orphaned runs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::error::Result;
use super::execution::{ExecutionRecord, ExecutionStatus};
use super::schedule::ScheduleId;
use crate::store::ExecutionStore;

/// Error message written to runs found still `Running` after a restart.
pub const INTERRUPTED_ERROR: &str = "interrupted by restart";

/// Query filter for [`ExecutionHistory::statistics`].
#[derive(Debug, Clone, Default)]
pub struct StatisticsFilter {
    /// Restrict to one schedule.
    pub schedule_id: Option<ScheduleId>,
    /// Only count executions that started at or after this time.
    pub since: Option<DateTime<Utc>>,
}

/// Aggregate counts over a set of execution records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionStatistics {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub running: usize,
    /// Mean duration of settled attempts that reported one.
    pub avg_duration_ms: Option<u64>,
    /// Per-schedule breakdown.
    pub by_schedule: HashMap<ScheduleId, ScheduleCounts>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduleCounts {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub running: usize,
}

/// Execution record history over the persistent store.
#[derive(Clone)]
pub struct ExecutionHistory {
    store: Arc<dyn ExecutionStore>,
}

impl ExecutionHistory {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    /// Upsert a record. Called once when an attempt starts and again when
    /// it settles.
    pub async fn record(&self, record: &ExecutionRecord) -> Result<()> {
        self.store.save(record).await?;
        Ok(())
    }

    pub async fn get(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        Ok(self.store.load(execution_id).await?)
    }

    /// Most recent executions first, optionally for one schedule.
    pub async fn recent(
        &self,
        schedule_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>> {
        let mut records: Vec<ExecutionRecord> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|r| schedule_id.is_none_or(|id| r.schedule_id == id))
            .collect();

        records.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| b.id.cmp(&a.id))
        });
        records.truncate(limit);
        Ok(records)
    }

    /// Records that started at or after `cutoff`.
    pub async fn since(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExecutionRecord>> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|r| r.start_time >= cutoff)
            .collect())
    }

    /// Records currently in `Running` state.
    pub async fn running(&self) -> Result<Vec<ExecutionRecord>> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|r| r.status == ExecutionStatus::Running)
            .collect())
    }

    /// Compute aggregate statistics for the records matching `filter`.
    pub async fn statistics(&self, filter: &StatisticsFilter) -> Result<ExecutionStatistics> {
        let records = self.store.list().await?;

        let mut stats = ExecutionStatistics::default();
        let mut duration_sum: u64 = 0;
        let mut duration_count: u64 = 0;

        for record in records {
            if let Some(id) = &filter.schedule_id
                && record.schedule_id != *id
            {
                continue;
            }
            if let Some(since) = filter.since
                && record.start_time < since
            {
                continue;
            }

            stats.total += 1;
            let counts = stats
                .by_schedule
                .entry(record.schedule_id.clone())
                .or_default();
            counts.total += 1;

            match record.status {
                ExecutionStatus::Success => {
                    stats.succeeded += 1;
                    counts.succeeded += 1;
                }
                ExecutionStatus::Failed => {
                    stats.failed += 1;
                    counts.failed += 1;
                }
                ExecutionStatus::Running => {
                    stats.running += 1;
                    counts.running += 1;
                }
            }

            if record.status != ExecutionStatus::Running
                && let Some(duration) = record.duration_ms
            {
                duration_sum += duration;
                duration_count += 1;
            }
        }

        if duration_count > 0 {
            stats.avg_duration_ms = Some(duration_sum / duration_count);
        }
        Ok(stats)
    }

    /// Delete settled records older than `older_than_days`.
    ///
    /// Age is measured from the end time, falling back to the start time
    /// for records that somehow settled without one. Running records are
    /// never deleted regardless of age. Returns the number deleted.
    pub async fn cleanup(&self, older_than_days: u32, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - chrono::Duration::days(i64::from(older_than_days));
        let records = self.store.list().await?;

        let mut deleted = 0;
        for record in records {
            if record.status == ExecutionStatus::Running {
                continue;
            }
            let reference = record.end_time.unwrap_or(record.start_time);
            if reference < cutoff {
                self.store.delete(&record.id).await?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!(deleted, older_than_days, "Cleaned up old executions");
        }
        Ok(deleted)
    }

    /// Fail any record left `Running` by a previous process.
    ///
    /// Called once on startup. The process that wrote those records is
    /// gone, so the runs can never settle on their own.
    pub async fn mark_interrupted(&self, now: DateTime<Utc>) -> Result<usize> {
        let orphaned = self.running().await?;

        let mut marked = 0;
        for mut record in orphaned {
            warn!(
                execution_id = %record.id,
                schedule_id = %record.schedule_id,
                "Marking orphaned run as failed"
            );
            record.complete_failure(now, INTERRUPTED_ERROR);
            self.store.save(&record).await?;
            marked += 1;
        }
        Ok(marked)
    }
}
