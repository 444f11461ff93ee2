//! Engine health evaluation.
//!
//! Pure rules over the current engine state. The service gathers the
//! inputs (queue length, busy slots, a day of execution records) and this
//! module turns them into a status with human-readable issues.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::execution::{ExecutionRecord, ExecutionStatus};

/// Failure rate over the last day that makes the engine critical.
pub const CRITICAL_FAILURE_RATE: f64 = 0.5;

/// Failure rate over the last day that makes the engine degraded.
pub const WARNING_FAILURE_RATE: f64 = 0.2;

/// Queue length above which the engine is considered backed up.
pub const QUEUE_BACKLOG_WARNING: usize = 10;

/// How long a run may stay `Running` before it counts as stuck (2 hours).
pub const STUCK_EXECUTION_SECS: i64 = 2 * 60 * 60;

/// Window the failure rate is computed over.
pub const FAILURE_WINDOW_HOURS: i64 = 24;

/// Overall engine health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Degraded but operational.
    Warning,
    Critical,
}

impl HealthStatus {
    /// Combine two statuses (worst wins).
    pub fn combine(&self, other: &HealthStatus) -> HealthStatus {
        match (self, other) {
            (HealthStatus::Critical, _) | (_, HealthStatus::Critical) => HealthStatus::Critical,
            (HealthStatus::Warning, _) | (_, HealthStatus::Warning) => HealthStatus::Warning,
            _ => HealthStatus::Healthy,
        }
    }
}

/// Health report with every issue that tripped a rule.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    /// Enabled schedules known to the engine.
    pub active_schedules: usize,
    pub running_executions: usize,
    pub queue_length: usize,
    pub max_concurrent: usize,
    /// Failure rate over settled runs in the window. `None` when nothing
    /// settled.
    pub failure_rate: Option<f64>,
    /// Start of the most recent run on record, which may predate the
    /// failure window.
    pub last_execution_time: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
}

impl SystemHealth {
    fn add_issue(&mut self, status: HealthStatus, message: String) {
        self.status = self.status.combine(&status);
        self.issues.push(message);
    }
}

/// Evaluate engine health.
///
/// `records` is expected to cover the last [`FAILURE_WINDOW_HOURS`] plus
/// any run that is still in flight. Running records never count toward the
/// failure rate but do trip the stuck-run rule once they exceed
/// [`STUCK_EXECUTION_SECS`]. `last_execution` is the start of the most
/// recent run overall, so an engine that has been idle longer than the
/// window still reports when it last did anything.
pub fn evaluate(
    active_schedules: usize,
    queue_length: usize,
    running: usize,
    max_concurrent: usize,
    records: &[ExecutionRecord],
    last_execution: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> SystemHealth {
    let mut health = SystemHealth {
        status: HealthStatus::Healthy,
        issues: Vec::new(),
        active_schedules,
        running_executions: running,
        queue_length,
        max_concurrent,
        failure_rate: None,
        last_execution_time: last_execution,
        checked_at: now,
    };

    let settled = records.iter().filter(|r| r.is_settled()).count();
    let failed = records
        .iter()
        .filter(|r| r.status == ExecutionStatus::Failed)
        .count();

    if settled > 0 {
        let rate = failed as f64 / settled as f64;
        health.failure_rate = Some(rate);

        if rate > CRITICAL_FAILURE_RATE {
            health.add_issue(
                HealthStatus::Critical,
                format!(
                    "failure rate {:.0}% over the last {FAILURE_WINDOW_HOURS}h",
                    rate * 100.0
                ),
            );
        } else if rate > WARNING_FAILURE_RATE {
            health.add_issue(
                HealthStatus::Warning,
                format!(
                    "failure rate {:.0}% over the last {FAILURE_WINDOW_HOURS}h",
                    rate * 100.0
                ),
            );
        }
    }

    if queue_length > QUEUE_BACKLOG_WARNING {
        health.add_issue(
            HealthStatus::Warning,
            format!("queue backlog at {queue_length} pending jobs"),
        );
    }

    if max_concurrent > 0 && running >= max_concurrent {
        health.add_issue(
            HealthStatus::Warning,
            format!("all {max_concurrent} execution slots busy"),
        );
    }

    for record in records {
        if record.status != ExecutionStatus::Running {
            continue;
        }
        let age = now - record.start_time;
        if age.num_seconds() > STUCK_EXECUTION_SECS {
            health.add_issue(
                HealthStatus::Warning,
                format!(
                    "run {} has been executing for {}m without settling",
                    record.id,
                    age.num_minutes()
                ),
            );
        }
    }

    health
}
