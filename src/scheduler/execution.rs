//! Execution records and execution-time payload preparation.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ExecutionRecord
// ============================================================================

/// Unique identifier for an execution.
pub type ExecutionId = String;

/// One execution attempt of a schedule.
///
/// Every attempt gets its own record with a fresh ID, including retries of
/// the same firing. A record is created in `Running` state when the job
/// starts and finalized exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique identifier.
    pub id: ExecutionId,
    /// Schedule this execution belongs to.
    pub schedule_id: String,
    /// When the job started.
    pub start_time: DateTime<Utc>,
    /// When the job settled. `None` while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Current state of the attempt.
    pub status: ExecutionStatus,
    /// Where the produced output landed, if the job reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Failure message for failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Delivery failure for otherwise successful attempts. Delivery problems
    /// never flip a success into a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
    /// Wall-clock duration of the attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Which retry this attempt is. Zero for the first attempt of a firing.
    #[serde(default)]
    pub retry_count: u32,
    /// Whether the attempt was requested manually rather than by the cron
    /// trigger.
    #[serde(default)]
    pub manual: bool,
}

impl ExecutionRecord {
    /// Generate a new execution ID.
    pub fn generate_id() -> ExecutionId {
        format!("exec_{}", ulid::Ulid::new())
    }

    /// Start a new attempt in `Running` state.
    pub fn started(
        schedule_id: impl Into<String>,
        now: DateTime<Utc>,
        retry_count: u32,
        manual: bool,
    ) -> Self {
        Self {
            id: Self::generate_id(),
            schedule_id: schedule_id.into(),
            start_time: now,
            end_time: None,
            status: ExecutionStatus::Running,
            output_path: None,
            error: None,
            delivery_error: None,
            duration_ms: None,
            retry_count,
            manual,
        }
    }

    /// Finalize as successful.
    pub fn complete_success(
        &mut self,
        now: DateTime<Utc>,
        output_path: Option<String>,
        delivery_error: Option<String>,
    ) {
        self.status = ExecutionStatus::Success;
        self.output_path = output_path;
        self.delivery_error = delivery_error;
        self.finish(now);
    }

    /// Finalize as failed.
    pub fn complete_failure(&mut self, now: DateTime<Utc>, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.finish(now);
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.end_time = Some(now);
        self.duration_ms = Some(
            (now - self.start_time)
                .num_milliseconds()
                .max(0) as u64,
        );
    }

    /// Whether the attempt has settled (success or failure).
    pub fn is_settled(&self) -> bool {
        self.status != ExecutionStatus::Running
    }
}

/// State of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The job is in flight.
    Running,
    /// The job settled successfully.
    Success,
    /// The job settled with an error.
    Failed,
}

// ============================================================================
// Time Range Resolution
// ============================================================================

/// Resolve a relative time window in a job payload to absolute bounds.
///
/// A payload may carry a `time_range` object with `last_minutes`,
/// `last_hours` or `last_days` keys. Those are resolved against the actual
/// execution time, not the scheduled fire time, so a job that sat in the
/// queue still reports on the window ending now. The relative keys are
/// replaced with RFC 3339 `start` and `end` bounds; payloads without a
/// relative window come back unchanged.
pub fn resolve_time_range(payload: &serde_json::Value, now: DateTime<Utc>) -> serde_json::Value {
    let mut resolved = payload.clone();

    let Some(range) = resolved.get_mut("time_range").and_then(|v| v.as_object_mut()) else {
        return resolved;
    };

    let minutes = range.get("last_minutes").and_then(|v| v.as_i64()).unwrap_or(0);
    let hours = range.get("last_hours").and_then(|v| v.as_i64()).unwrap_or(0);
    let days = range.get("last_days").and_then(|v| v.as_i64()).unwrap_or(0);
    if minutes == 0 && hours == 0 && days == 0 {
        return resolved;
    }

    let span = chrono::Duration::minutes(minutes)
        + chrono::Duration::hours(hours)
        + chrono::Duration::days(days);
    let start = now - span;

    range.clear();
    range.insert(
        "start".to_string(),
        serde_json::Value::String(start.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    range.insert(
        "end".to_string(),
        serde_json::Value::String(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );

    resolved
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn execution_id_is_unique() {
        let id1 = ExecutionRecord::generate_id();
        let id2 = ExecutionRecord::generate_id();
        assert_ne!(id1, id2);
        assert!(id1.starts_with("exec_"));
    }

    #[test]
    fn started_record_is_running() {
        let now = Utc::now();
        let record = ExecutionRecord::started("sched_1", now, 0, false);
        assert_eq!(record.schedule_id, "sched_1");
        assert_eq!(record.status, ExecutionStatus::Running);
        assert_eq!(record.start_time, now);
        assert!(record.end_time.is_none());
        assert!(!record.is_settled());
    }

    #[test]
    fn complete_success_sets_duration() {
        let start = parse_utc("2026-03-02T09:00:00Z");
        let end = parse_utc("2026-03-02T09:00:12Z");
        let mut record = ExecutionRecord::started("sched_1", start, 0, false);
        record.complete_success(end, Some("/out/sales.pdf".to_string()), None);

        assert_eq!(record.status, ExecutionStatus::Success);
        assert_eq!(record.end_time, Some(end));
        assert_eq!(record.duration_ms, Some(12_000));
        assert_eq!(record.output_path.as_deref(), Some("/out/sales.pdf"));
        assert!(record.is_settled());
    }

    #[test]
    fn complete_failure_records_error() {
        let start = Utc::now();
        let mut record = ExecutionRecord::started("sched_1", start, 2, true);
        record.complete_failure(start, "pipeline exited with status 3");

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("pipeline exited with status 3"));
        assert_eq!(record.retry_count, 2);
        assert!(record.manual);
    }

    #[test]
    fn success_with_delivery_error_stays_success() {
        let start = Utc::now();
        let mut record = ExecutionRecord::started("sched_1", start, 0, false);
        record.complete_success(start, None, Some("smtp unreachable".to_string()));

        assert_eq!(record.status, ExecutionStatus::Success);
        assert_eq!(record.delivery_error.as_deref(), Some("smtp unreachable"));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Failed).unwrap(),
            "\"failed\""
        );
    }

    #[test]
    fn resolve_rewrites_last_days() {
        let now = parse_utc("2026-03-08T09:00:00Z");
        let payload = json!({"report": "usage", "time_range": {"last_days": 7}});
        let resolved = resolve_time_range(&payload, now);

        assert_eq!(
            resolved["time_range"]["start"],
            json!("2026-03-01T09:00:00Z")
        );
        assert_eq!(resolved["time_range"]["end"], json!("2026-03-08T09:00:00Z"));
        assert!(resolved["time_range"].get("last_days").is_none());
        assert_eq!(resolved["report"], json!("usage"));
    }

    #[test]
    fn resolve_combines_relative_components() {
        let now = parse_utc("2026-03-02T12:30:00Z");
        let payload = json!({"time_range": {"last_hours": 12, "last_minutes": 30}});
        let resolved = resolve_time_range(&payload, now);

        assert_eq!(
            resolved["time_range"]["start"],
            json!("2026-03-02T00:00:00Z")
        );
    }

    #[test]
    fn resolve_leaves_absolute_range_untouched() {
        let payload = json!({
            "time_range": {"start": "2026-01-01T00:00:00Z", "end": "2026-02-01T00:00:00Z"}
        });
        let resolved = resolve_time_range(&payload, Utc::now());
        assert_eq!(resolved, payload);
    }

    #[test]
    fn resolve_without_time_range_is_identity() {
        let payload = json!({"report": "sales", "format": "pdf"});
        let resolved = resolve_time_range(&payload, Utc::now());
        assert_eq!(resolved, payload);
    }

    #[test]
    fn record_roundtrips_through_json() {
        let mut record = ExecutionRecord::started("sched_1", Utc::now(), 1, false);
        record.complete_failure(Utc::now(), "boom");

        let json = serde_json::to_string_pretty(&record).unwrap();
        let parsed: ExecutionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, record.id);
        assert_eq!(parsed.status, ExecutionStatus::Failed);
        assert_eq!(parsed.retry_count, 1);
    }
}
