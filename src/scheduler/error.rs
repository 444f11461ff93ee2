//! Scheduler error types.

use thiserror::Error;

use crate::store::StorageError;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid schedule definition or update.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Schedule not found.
    #[error("schedule not found: {0}")]
    ScheduleNotFound(String),

    /// Execution record not found.
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// Execution has not reached a terminal state yet.
    #[error("execution still running: {0}")]
    ExecutionStillRunning(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
