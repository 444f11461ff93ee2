//! Scheduling and execution engine for report jobs.
//!
//! Schedules carry a cron expression and an opaque job payload. The engine
//! arms one timer per enabled schedule, queues fired jobs by priority, and
//! hands them to a [`crate::runner::JobRunner`] under a concurrency cap.
//! Every attempt is recorded in execution history.
//!
//! # Usage
//!
//! ```ignore
//! // Start the engine
//! let config = SchedulerConfig { ... };
//! let service = SchedulerService::new(config);
//! let handle = service.start().await?;
//!
//! // Create a schedule
//! let schedule = handle
//!     .create_schedule(NewSchedule {
//!         name: "Daily sales".into(),
//!         cron_expression: "0 9 * * *".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! // Run it immediately at manual priority
//! let execution_id = handle.execute_manually(&schedule.id).await?;
//!
//! // Inspect history
//! let recent = handle.execution_history(&schedule.id, 20).await?;
//! ```

pub mod cache;
pub mod clock;
pub mod error;
pub mod execution;
pub mod health;
pub mod history;
pub mod queue;
pub mod schedule;
pub mod service;
pub mod trigger;

pub use cache::ScheduleCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, SchedulerError};
pub use execution::{ExecutionId, ExecutionRecord, ExecutionStatus};
pub use health::{HealthStatus, SystemHealth};
pub use history::{ExecutionHistory, ExecutionStatistics, StatisticsFilter};
pub use queue::{DEFAULT_PRIORITY, MANUAL_PRIORITY, QueueItem};
pub use schedule::{
    DeliveryOptions, LastStatus, NewSchedule, ScheduleDefinition, ScheduleId, ScheduleUpdate,
};
pub use service::{EngineStatus, SchedulerConfig, SchedulerHandle, SchedulerService};
