//! Schedule data structures.
//!
//! Defines the persisted schedule record, the inputs used to create and
//! update one, and the cron helpers that validate trigger expressions and
//! compute the next fire time.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{Result, SchedulerError};

// ============================================================================
// ScheduleDefinition - Main Type
// ============================================================================

/// Unique identifier for a schedule.
pub type ScheduleId = String;

/// A persisted report schedule.
///
/// Everything up to `owner` is definition; the remaining fields are derived
/// state maintained by the engine after each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    /// Unique identifier.
    pub id: ScheduleId,
    /// Human-readable name.
    pub name: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque job payload, handed to the job pipeline verbatim (relative
    /// time windows are resolved at execution time, see
    /// [`super::execution::resolve_time_range`]).
    pub payload: serde_json::Value,
    /// Cron trigger expression.
    pub cron_expression: String,
    /// Whether the schedule fires. Disabled schedules keep their definition
    /// but never produce queue items.
    pub enabled: bool,
    /// How produced output should be delivered.
    #[serde(default)]
    pub delivery: DeliveryOptions,
    /// Owner identifier for list filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// When the schedule was created.
    pub created_at: DateTime<Utc>,
    /// When the schedule was last modified.
    pub updated_at: DateTime<Utc>,
    /// When the schedule is next due to fire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    /// Start time of the most recent run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    /// Outcome of the most recent run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<LastStatus>,
    /// Error message of the most recent failed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ScheduleDefinition {
    /// Generate a new schedule ID.
    pub fn generate_id() -> ScheduleId {
        format!("sched_{}", ulid::Ulid::new())
    }

    /// Build a schedule from caller input.
    ///
    /// Validates the name and cron expression and computes the initial
    /// `next_run`. Rejects malformed input synchronously; nothing is
    /// persisted here.
    pub fn create(input: NewSchedule, now: DateTime<Utc>) -> Result<Self> {
        if input.name.trim().is_empty() {
            return Err(SchedulerError::InvalidSchedule(
                "name must not be empty".to_string(),
            ));
        }
        validate_cron(&input.cron_expression)?;

        // Disabled schedules advertise no next run until resumed.
        let next_run = if input.enabled {
            next_occurrence(&input.cron_expression, now)
        } else {
            None
        };

        Ok(Self {
            id: Self::generate_id(),
            name: input.name,
            description: input.description,
            payload: input.payload,
            cron_expression: input.cron_expression,
            enabled: input.enabled,
            delivery: input.delivery,
            owner: input.owner,
            created_at: now,
            updated_at: now,
            next_run,
            last_run: None,
            last_status: None,
            last_error: None,
        })
    }
}

// ============================================================================
// Component Types
// ============================================================================

/// How a schedule's output is delivered once the job pipeline produced it.
///
/// Delivery is performed by the external pipeline; the engine just carries
/// these options through and records delivery failures on the execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOptions {
    /// Persist the produced output to storage.
    #[serde(default)]
    pub save_output: bool,
    /// Send a notification with the output.
    #[serde(default)]
    pub send_notification: bool,
    /// Notification recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
    /// Custom output location, overriding the pipeline default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
}

/// Outcome of the most recent run of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastStatus {
    /// A run is currently in flight.
    Running,
    /// The last run succeeded.
    Success,
    /// The last run failed.
    Failed,
}

// ============================================================================
// Caller Inputs
// ============================================================================

/// Input for creating a schedule.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub name: String,
    pub description: Option<String>,
    pub payload: serde_json::Value,
    pub cron_expression: String,
    pub enabled: bool,
    pub delivery: DeliveryOptions,
    pub owner: Option<String>,
}

impl Default for NewSchedule {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            payload: serde_json::Value::Null,
            cron_expression: String::new(),
            enabled: true,
            delivery: DeliveryOptions::default(),
            owner: None,
        }
    }
}

/// Partial update for a schedule. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub payload: Option<serde_json::Value>,
    pub cron_expression: Option<String>,
    pub enabled: Option<bool>,
    pub delivery: Option<DeliveryOptions>,
    pub owner: Option<Option<String>>,
}

impl ScheduleUpdate {
    /// Whether the update carries any change at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.payload.is_none()
            && self.cron_expression.is_none()
            && self.enabled.is_none()
            && self.delivery.is_none()
            && self.owner.is_none()
    }

    /// Apply the populated fields to `schedule`.
    pub fn apply_to(&self, schedule: &mut ScheduleDefinition) {
        if let Some(name) = &self.name {
            schedule.name = name.clone();
        }
        if let Some(description) = &self.description {
            schedule.description = description.clone();
        }
        if let Some(payload) = &self.payload {
            schedule.payload = payload.clone();
        }
        if let Some(expr) = &self.cron_expression {
            schedule.cron_expression = expr.clone();
        }
        if let Some(enabled) = self.enabled {
            schedule.enabled = enabled;
        }
        if let Some(delivery) = &self.delivery {
            schedule.delivery = delivery.clone();
        }
        if let Some(owner) = &self.owner {
            schedule.owner = owner.clone();
        }
    }
}

// ============================================================================
// Cron Helpers
// ============================================================================

/// Parse a cron expression, accepting the classic five-field form.
///
/// The `cron` crate expects a seconds field. Report schedules are usually
/// written in the five-field crontab dialect ("0 9 * * *"), so a five-field
/// expression gets a zero seconds field prepended before parsing; six- and
/// seven-field expressions pass through unchanged.
fn parse_cron(expr: &str) -> Result<cron::Schedule> {
    let trimmed = expr.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    };

    cron::Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron(e.to_string()))
}

/// Validate a cron expression without computing anything.
pub fn validate_cron(expr: &str) -> Result<()> {
    parse_cron(expr).map(|_| ())
}

/// Compute the next fire time strictly after `after`.
///
/// Returns `None` for expressions with no future occurrence (exhausted year
/// ranges) or expressions that fail to parse; callers validate separately,
/// so a parse failure here only happens for schedules edited on disk by
/// hand.
pub fn next_occurrence(expr: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let schedule = parse_cron(expr).ok()?;
    schedule.after(&after).next()
}

// ============================================================================
// Tests
// ============================================================================
