//! Pending execution queue.
//!
//! Holds jobs that have fired but not yet started, ordered by priority with
//! FIFO ties. The queue never executes anything itself; the service loop
//! pops due items whenever an execution slot is free.

use chrono::{DateTime, Utc};

use super::execution::ExecutionId;
use super::schedule::ScheduleId;

/// Priority for cron-triggered and retry items.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Priority for manually requested runs.
pub const MANUAL_PRIORITY: i32 = 100;

/// One pending job waiting for an execution slot.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub schedule_id: ScheduleId,
    pub priority: i32,
    /// When the item becomes eligible to start. Trigger fires are due
    /// immediately; retries carry a future due time.
    pub scheduled_time: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
    /// Retry attempt this item represents. Zero for a fresh firing.
    pub retry_count: u32,
    pub manual: bool,
    /// Execution ID assigned up front for manual runs, so the requester
    /// knows which record the run will settle under.
    pub execution_id: Option<ExecutionId>,
}

impl QueueItem {
    /// Item for a cron trigger fire.
    pub fn triggered(schedule_id: ScheduleId, fire_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            schedule_id,
            priority: DEFAULT_PRIORITY,
            scheduled_time: fire_at,
            enqueued_at: now,
            retry_count: 0,
            manual: false,
            execution_id: None,
        }
    }

    /// Item for a manually requested run, due immediately.
    pub fn manual(schedule_id: ScheduleId, execution_id: ExecutionId, now: DateTime<Utc>) -> Self {
        Self {
            schedule_id,
            priority: MANUAL_PRIORITY,
            scheduled_time: now,
            enqueued_at: now,
            retry_count: 0,
            manual: true,
            execution_id: Some(execution_id),
        }
    }

    /// Item for a delayed retry of a failed attempt.
    pub fn retry(
        schedule_id: ScheduleId,
        due_time: DateTime<Utc>,
        retry_count: u32,
        manual: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            schedule_id,
            priority: DEFAULT_PRIORITY,
            scheduled_time: due_time,
            enqueued_at: now,
            retry_count,
            manual,
            execution_id: None,
        }
    }
}

/// Priority queue over pending items with one slot per schedule.
#[derive(Debug, Default)]
pub struct ExecutionQueue {
    items: Vec<QueueItem>,
}

impl ExecutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an item, coalescing with any pending item for the same
    /// schedule.
    ///
    /// The pending item keeps the strongest priority, the earliest due
    /// time, and the first assigned execution ID of everything merged into
    /// it. Returns whether the queue changed.
    pub fn push(&mut self, item: QueueItem) -> bool {
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|i| i.schedule_id == item.schedule_id)
        {
            let mut changed = false;
            let upgraded = item.priority > existing.priority;
            if upgraded {
                existing.priority = item.priority;
                changed = true;
            }
            if item.scheduled_time < existing.scheduled_time {
                existing.scheduled_time = item.scheduled_time;
                changed = true;
            }
            if item.manual && !existing.manual {
                existing.manual = true;
                changed = true;
            }
            if existing.execution_id.is_none() && item.execution_id.is_some() {
                existing.execution_id = item.execution_id;
                changed = true;
            }
            if upgraded {
                self.sort();
            }
            return changed;
        }

        self.items.push(item);
        self.sort();
        true
    }

    /// Remove and return the highest-priority item that is due at `now`.
    ///
    /// Items with a future due time are skipped, so a high-priority retry
    /// waiting out its delay never blocks other schedules.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<QueueItem> {
        let pos = self.items.iter().position(|i| i.scheduled_time <= now)?;
        Some(self.items.remove(pos))
    }

    /// Drop the pending item for a schedule, if any.
    pub fn remove(&mut self, schedule_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.schedule_id != schedule_id);
        self.items.len() != before
    }

    pub fn contains(&self, schedule_id: &str) -> bool {
        self.items.iter().any(|i| i.schedule_id == schedule_id)
    }

    /// Execution ID already assigned to the pending item for a schedule.
    pub fn pending_execution_id(&self, schedule_id: &str) -> Option<ExecutionId> {
        self.items
            .iter()
            .find(|i| i.schedule_id == schedule_id)
            .and_then(|i| i.execution_id.clone())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    // Stable sort keeps insertion order within a priority band, which is
    // what gives equal-priority items FIFO dispatch.
    fn sort(&mut self) {
        self.items.sort_by(|a, b| b.priority.cmp(&a.priority));
    }
}
