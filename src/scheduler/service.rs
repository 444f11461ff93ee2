//! Scheduler service for executing report jobs.
//!
//! Runs as a background task. Cron timers feed trigger events into the
//! service loop, which queues jobs and dispatches them to the runner
//! whenever an execution slot is free. A handle exposes the management
//! operations and can be cloned freely.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::runner::{JobRequest, JobRunner};
use crate::store::{ExecutionStore, ScheduleStore};

use super::cache::ScheduleCache;
use super::clock::Clock;
use super::error::{Result, SchedulerError};
use super::execution::{ExecutionId, ExecutionRecord, resolve_time_range};
use super::health::{self, SystemHealth};
use super::history::{ExecutionHistory, ExecutionStatistics, StatisticsFilter};
use super::queue::{ExecutionQueue, QueueItem};
use super::schedule::{
    LastStatus, NewSchedule, ScheduleDefinition, ScheduleId, ScheduleUpdate, next_occurrence,
    validate_cron,
};
use super::trigger::{TriggerEngine, TriggerEvent};

/// Maximum retries after a failed attempt.
const MAX_RETRIES: u32 = 3;

/// Base delay before a retry; grows linearly with the attempt number.
const RETRY_DELAY_SECS: i64 = 60;

// ============================================================================
// Public API
// ============================================================================

/// Handle for interacting with the scheduler service.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    shared: Arc<EngineShared>,
}

impl SchedulerHandle {
    /// Create a new schedule.
    ///
    /// Validates the input, persists the schedule, then arms its trigger.
    /// Nothing is written for invalid input.
    pub async fn create_schedule(&self, input: NewSchedule) -> Result<ScheduleDefinition> {
        let schedule = ScheduleDefinition::create(input, self.shared.clock.now())?;

        // Store first; the trigger is armed only once the schedule is on disk.
        self.shared.cache.create(schedule.clone()).await?;

        if schedule.enabled {
            let _ = self
                .command_tx
                .send(SchedulerCommand::Arm(Box::new(schedule.clone())))
                .await;
        }
        Ok(schedule)
    }

    /// Apply a partial update to a schedule.
    ///
    /// Changing the cron expression or the enabled flag recomputes the next
    /// run and re-arms (or disarms) the trigger.
    pub async fn update_schedule(
        &self,
        id: &str,
        update: ScheduleUpdate,
    ) -> Result<ScheduleDefinition> {
        if let Some(name) = &update.name
            && name.trim().is_empty()
        {
            return Err(SchedulerError::InvalidSchedule(
                "name must not be empty".to_string(),
            ));
        }
        if let Some(expr) = &update.cron_expression {
            validate_cron(expr)?;
        }

        let now = self.shared.clock.now();
        let rearm = update.cron_expression.is_some() || update.enabled.is_some();

        let updated = self
            .shared
            .cache
            .update_atomically(id, |schedule| {
                update.apply_to(schedule);
                schedule.updated_at = now;
                if rearm {
                    schedule.next_run = if schedule.enabled {
                        next_occurrence(&schedule.cron_expression, now)
                    } else {
                        None
                    };
                }
            })
            .await?;

        if rearm {
            let command = if updated.enabled {
                SchedulerCommand::Arm(Box::new(updated.clone()))
            } else {
                SchedulerCommand::Disarm(updated.id.clone())
            };
            let _ = self.command_tx.send(command).await;
        }
        Ok(updated)
    }

    /// Enable or disable a schedule.
    ///
    /// Disabling cancels the armed trigger and drops any pending queue
    /// item; a job already executing is left to settle.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<ScheduleDefinition> {
        self.update_schedule(
            id,
            ScheduleUpdate {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    /// Delete a schedule, its trigger, and any pending queue item.
    ///
    /// Returns whether the schedule existed; deleting an unknown ID is a
    /// no-op. Execution history is kept.
    pub async fn delete_schedule(&self, id: &str) -> Result<bool> {
        let existed = self.shared.cache.delete(id).await?;
        if existed {
            let _ = self
                .command_tx
                .send(SchedulerCommand::Disarm(id.to_string()))
                .await;
        }
        Ok(existed)
    }

    /// Get a schedule by ID.
    pub async fn get_schedule(&self, id: &str) -> Option<ScheduleDefinition> {
        self.shared.cache.get(id).await
    }

    /// List schedules, optionally restricted to one owner.
    pub async fn list_schedules(&self, owner: Option<&str>) -> Vec<ScheduleDefinition> {
        self.shared.cache.list(owner).await
    }

    /// Queue an immediate run of a schedule at manual priority.
    ///
    /// Returns the execution ID the run will settle under. A request made
    /// while a manual run is still pending coalesces into it and returns
    /// the pending ID.
    pub async fn execute_manually(&self, id: &str) -> Result<ExecutionId> {
        if self.shared.cache.get(id).await.is_none() {
            return Err(SchedulerError::ScheduleNotFound(id.to_string()));
        }
        Ok(self.queue_manual_run(id).await)
    }

    /// Queue a fresh run of the schedule behind a settled execution.
    ///
    /// The new attempt runs at manual priority and settles under the
    /// returned execution ID.
    pub async fn retry_execution(&self, execution_id: &str) -> Result<ExecutionId> {
        let record = self
            .shared
            .history
            .get(execution_id)
            .await?
            .ok_or_else(|| SchedulerError::ExecutionNotFound(execution_id.to_string()))?;
        if !record.is_settled() {
            return Err(SchedulerError::ExecutionStillRunning(
                execution_id.to_string(),
            ));
        }
        if self.shared.cache.get(&record.schedule_id).await.is_none() {
            return Err(SchedulerError::ScheduleNotFound(record.schedule_id));
        }

        Ok(self.queue_manual_run(&record.schedule_id).await)
    }

    /// Queue a manual-priority item carrying a freshly assigned execution
    /// ID, then nudge the loop so dispatch does not wait for the next tick.
    async fn queue_manual_run(&self, schedule_id: &str) -> ExecutionId {
        let execution_id = {
            let mut queue = self.shared.queue.lock().await;
            match queue.pending_execution_id(schedule_id) {
                Some(pending) => pending,
                None => {
                    let execution_id = ExecutionRecord::generate_id();
                    queue.push(QueueItem::manual(
                        schedule_id.to_string(),
                        execution_id.clone(),
                        self.shared.clock.now(),
                    ));
                    execution_id
                }
            }
        };
        let _ = self.command_tx.send(SchedulerCommand::Dispatch).await;
        execution_id
    }

    /// Get one execution record.
    pub async fn get_execution(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        self.shared.history.get(execution_id).await
    }

    /// Execution records for one schedule, most recent first.
    pub async fn execution_history(
        &self,
        schedule_id: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>> {
        self.shared.history.recent(Some(schedule_id), limit).await
    }

    /// Recent executions across all schedules, most recent first.
    pub async fn recent_executions(&self, limit: usize) -> Result<Vec<ExecutionRecord>> {
        self.shared.history.recent(None, limit).await
    }

    /// Aggregate execution counts and mean duration, optionally scoped to
    /// one schedule.
    pub async fn execution_metrics(
        &self,
        schedule_id: Option<&str>,
    ) -> Result<ExecutionStatistics> {
        let filter = StatisticsFilter {
            schedule_id: schedule_id.map(str::to_string),
            ..Default::default()
        };
        self.shared.history.statistics(&filter).await
    }

    /// Delete settled execution records older than `older_than_days`.
    pub async fn cleanup_executions(&self, older_than_days: u32) -> Result<usize> {
        self.shared
            .history
            .cleanup(older_than_days, self.shared.clock.now())
            .await
    }

    /// Evaluate engine health.
    pub async fn system_health(&self) -> Result<SystemHealth> {
        let now = self.shared.clock.now();
        let cutoff = now - chrono::Duration::hours(health::FAILURE_WINDOW_HOURS);

        let mut records = self.shared.history.since(cutoff).await?;
        for record in self.shared.history.running().await? {
            if !records.iter().any(|r| r.id == record.id) {
                records.push(record);
            }
        }

        // The most recent run overall, not just within the failure window,
        // so a quiet engine still reports when it last did anything.
        let last_execution = self
            .shared
            .history
            .recent(None, 1)
            .await?
            .first()
            .map(|r| r.start_time);

        let active_schedules = self.shared.cache.list_enabled().await.len();
        let queue_length = self.shared.queue.lock().await.len();
        Ok(health::evaluate(
            active_schedules,
            queue_length,
            self.shared.running(),
            self.shared.max_concurrent,
            &records,
            last_execution,
            now,
        ))
    }

    /// Snapshot of current engine state.
    pub async fn get_status(&self) -> EngineStatus {
        EngineStatus {
            schedules: self.shared.cache.count().await,
            armed_triggers: self.shared.trigger.armed_count().await,
            queue_depth: self.shared.queue.lock().await.len(),
            running: self.shared.running(),
            max_concurrent: self.shared.max_concurrent,
        }
    }

    /// Shut down the scheduler.
    ///
    /// Cancels all timers and stops dispatching; jobs already executing
    /// are left to settle and release their slots.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(SchedulerCommand::Shutdown).await;
    }
}

/// Snapshot of engine counters.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub schedules: usize,
    pub armed_triggers: usize,
    pub queue_depth: usize,
    pub running: usize,
    pub max_concurrent: usize,
}

/// Configuration for the scheduler service.
pub struct SchedulerConfig {
    /// Storage backend for schedule persistence.
    pub schedule_store: Arc<dyn ScheduleStore>,
    /// Storage backend for execution history.
    pub execution_store: Arc<dyn ExecutionStore>,
    /// Executes queued jobs.
    pub runner: Arc<dyn JobRunner>,
    /// Time source, injected so retry and retention behavior is testable.
    pub clock: Arc<dyn Clock>,
    /// Number of jobs that may execute at once.
    pub max_concurrent: usize,
    /// How often the dispatch loop scans the queue for due items.
    pub tick_interval: Duration,
}

/// The scheduler service.
pub struct SchedulerService {
    config: SchedulerConfig,
}

impl SchedulerService {
    /// Create a new scheduler service.
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Start the scheduler service.
    ///
    /// Loads persisted schedules, recovers executions orphaned by a
    /// previous process, arms triggers without backfilling missed
    /// occurrences, and spawns the service loop. Returns a handle for
    /// interacting with the service.
    pub async fn start(self) -> Result<SchedulerHandle> {
        let SchedulerConfig {
            schedule_store,
            execution_store,
            runner,
            clock,
            max_concurrent,
            tick_interval,
        } = self.config;

        let (command_tx, command_rx) = mpsc::channel(100);
        let (trigger_tx, trigger_rx) = mpsc::channel(256);

        let shared = Arc::new(EngineShared {
            cache: ScheduleCache::new(schedule_store),
            history: ExecutionHistory::new(execution_store),
            queue: Mutex::new(ExecutionQueue::new()),
            trigger: TriggerEngine::new(trigger_tx),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            runner,
            clock,
            max_concurrent,
        });

        shared.cache.load().await?;

        let now = shared.clock.now();
        match shared.history.mark_interrupted(now).await {
            Ok(0) => {}
            Ok(marked) => info!(marked, "Recovered interrupted executions"),
            Err(e) => warn!(error = %e, "Failed to recover interrupted executions"),
        }

        // Arm every enabled schedule. Occurrences missed while the process
        // was down are skipped, never backfilled.
        for schedule in shared.cache.list_enabled().await {
            let next = match schedule.next_run {
                Some(t) if t > now => t,
                _ => {
                    if let Some(missed) = schedule.next_run {
                        info!(
                            schedule_id = %schedule.id,
                            missed = %missed,
                            "Skipping occurrence missed while stopped"
                        );
                    }
                    let Some(next) = next_occurrence(&schedule.cron_expression, now) else {
                        warn!(schedule_id = %schedule.id, "Schedule has no upcoming occurrence");
                        continue;
                    };
                    next
                }
            };

            if schedule.next_run != Some(next)
                && let Err(e) = shared
                    .cache
                    .update_atomically(&schedule.id, |s| s.next_run = Some(next))
                    .await
            {
                error!(schedule_id = %schedule.id, error = %e, "Failed to persist next run time");
            }
            shared.trigger.arm(&schedule.id, next).await;
        }

        let service = ServiceLoop {
            shared: Arc::clone(&shared),
            tick_interval,
        };
        tokio::spawn(service.run(command_rx, trigger_rx));

        Ok(SchedulerHandle { command_tx, shared })
    }
}

// ============================================================================
// Internal Types
// ============================================================================

/// Command to the scheduler service.
enum SchedulerCommand {
    /// Arm the trigger for a schedule.
    Arm(Box<ScheduleDefinition>),
    /// Cancel the trigger and drop any pending queue item.
    Disarm(ScheduleId),
    /// Scan the queue for due work immediately.
    Dispatch,
    /// Shutdown the service.
    Shutdown,
}

/// State shared between the loop, executors, and handles.
struct EngineShared {
    cache: ScheduleCache,
    history: ExecutionHistory,
    queue: Mutex<ExecutionQueue>,
    trigger: TriggerEngine,
    /// Execution slots. A permit is held from dispatch until the job
    /// settles, so the busy count is exact even across retries.
    semaphore: Arc<Semaphore>,
    runner: Arc<dyn JobRunner>,
    clock: Arc<dyn Clock>,
    max_concurrent: usize,
}

impl EngineShared {
    fn running(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.semaphore.available_permits())
    }
}

struct ServiceLoop {
    shared: Arc<EngineShared>,
    tick_interval: Duration,
}

impl ServiceLoop {
    /// Main service loop.
    async fn run(
        self,
        mut command_rx: mpsc::Receiver<SchedulerCommand>,
        mut trigger_rx: mpsc::Receiver<TriggerEvent>,
    ) {
        info!("Scheduler service started");

        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::Arm(schedule)) => {
                            self.arm_schedule(&schedule).await;
                        }
                        Some(SchedulerCommand::Disarm(id)) => {
                            self.shared.trigger.disarm(&id).await;
                            self.shared.queue.lock().await.remove(&id);
                        }
                        Some(SchedulerCommand::Dispatch) => {
                            self.dispatch_due().await;
                        }
                        // A closed channel means every handle is gone.
                        Some(SchedulerCommand::Shutdown) | None => {
                            info!("Scheduler service shutting down");
                            self.shared.trigger.disarm_all().await;
                            break;
                        }
                    }
                }
                Some(event) = trigger_rx.recv() => {
                    self.handle_trigger(event).await;
                    self.dispatch_due().await;
                }
                _ = tick.tick() => {
                    self.dispatch_due().await;
                }
            }
        }

        info!("Scheduler service stopped");
    }

    async fn arm_schedule(&self, schedule: &ScheduleDefinition) {
        let Some(next_run) = schedule.next_run else {
            warn!(schedule_id = %schedule.id, "Schedule has no upcoming occurrence");
            return;
        };
        self.shared.trigger.arm(&schedule.id, next_run).await;
    }

    /// A cron timer fired: queue the job and arm the next occurrence.
    async fn handle_trigger(&self, event: TriggerEvent) {
        let Some(schedule) = self.shared.cache.get(&event.schedule_id).await else {
            debug!(schedule_id = %event.schedule_id, "Trigger fired for removed schedule");
            return;
        };
        if !schedule.enabled {
            debug!(schedule_id = %event.schedule_id, "Trigger fired for disabled schedule");
            return;
        }

        let now = self.shared.clock.now();
        debug!(schedule_id = %schedule.id, fire_at = %event.fire_at, "Schedule fired");
        self.shared
            .queue
            .lock()
            .await
            .push(QueueItem::triggered(schedule.id.clone(), event.fire_at, now));

        // Persist the recomputed next run before arming, same as on create.
        let next = next_occurrence(&schedule.cron_expression, now);
        match self
            .shared
            .cache
            .update_atomically(&schedule.id, |s| s.next_run = next)
            .await
        {
            Ok(_) => {
                if let Some(next) = next {
                    self.shared.trigger.arm(&schedule.id, next).await;
                } else {
                    info!(schedule_id = %schedule.id, "No further occurrences, schedule will not fire again");
                }
            }
            Err(e) => {
                error!(schedule_id = %schedule.id, error = %e, "Failed to persist next run time");
            }
        }
    }

    /// Start every due job there is a free slot for.
    async fn dispatch_due(&self) {
        loop {
            // Take the slot before the item so a popped job is never left
            // waiting without a permit.
            let Ok(permit) = Arc::clone(&self.shared.semaphore).try_acquire_owned() else {
                break;
            };

            let now = self.shared.clock.now();
            let Some(item) = self.shared.queue.lock().await.pop_due(now) else {
                break;
            };

            tokio::spawn(execute_item(Arc::clone(&self.shared), item, permit));
        }
    }
}

// ============================================================================
// Execution
// ============================================================================

fn retry_delay(retry_count: u32) -> chrono::Duration {
    chrono::Duration::seconds(RETRY_DELAY_SECS * i64::from(retry_count))
}

/// Run one queued job to completion.
///
/// Holds `permit` for the whole attempt; the slot is released only when
/// the job has settled and its record is written.
async fn execute_item(shared: Arc<EngineShared>, item: QueueItem, permit: OwnedSemaphorePermit) {
    let _permit = permit;

    let Some(schedule) = shared.cache.get(&item.schedule_id).await else {
        debug!(schedule_id = %item.schedule_id, "Dropping job for removed schedule");
        return;
    };
    if !schedule.enabled {
        debug!(schedule_id = %schedule.id, "Dropping job for disabled schedule");
        return;
    }

    let started_at = shared.clock.now();
    let mut record =
        ExecutionRecord::started(schedule.id.clone(), started_at, item.retry_count, item.manual);
    // Manual runs settle under the ID handed back to the requester.
    if let Some(id) = item.execution_id {
        record.id = id;
    }

    info!(
        schedule_id = %schedule.id,
        execution_id = %record.id,
        retry_count = item.retry_count,
        manual = item.manual,
        "Executing schedule"
    );

    if let Err(e) = shared.history.record(&record).await {
        error!(execution_id = %record.id, error = %e, "Failed to persist execution record");
    }
    if let Err(e) = shared
        .cache
        .update_atomically(&schedule.id, |s| {
            s.last_run = Some(started_at);
            s.last_status = Some(LastStatus::Running);
            s.last_error = None;
        })
        .await
    {
        debug!(schedule_id = %schedule.id, error = %e, "Could not mark schedule running");
    }

    // Relative time windows resolve against the actual execution time.
    let request = JobRequest {
        schedule_id: schedule.id.clone(),
        execution_id: record.id.clone(),
        schedule_name: schedule.name.clone(),
        payload: resolve_time_range(&schedule.payload, started_at),
        delivery: schedule.delivery.clone(),
    };

    let result = shared.runner.run_job(&request).await;
    let settled_at = shared.clock.now();

    match result {
        Ok(outcome) => {
            if let Some(delivery_error) = &outcome.delivery_error {
                warn!(
                    schedule_id = %schedule.id,
                    execution_id = %record.id,
                    error = %delivery_error,
                    "Report produced but delivery failed"
                );
            }
            record.complete_success(settled_at, outcome.output_path, outcome.delivery_error);

            if let Err(e) = shared.history.record(&record).await {
                error!(execution_id = %record.id, error = %e, "Failed to persist execution record");
            }
            // Completion also refreshes the advertised next run, in case
            // the job ran past the occurrence the trigger armed.
            if let Err(e) = shared
                .cache
                .update_atomically(&schedule.id, |s| {
                    s.last_status = Some(LastStatus::Success);
                    s.last_error = None;
                    if s.enabled {
                        s.next_run = next_occurrence(&s.cron_expression, settled_at);
                    }
                })
                .await
            {
                debug!(schedule_id = %schedule.id, error = %e, "Could not update schedule state");
            }

            info!(
                schedule_id = %schedule.id,
                execution_id = %record.id,
                duration_ms = record.duration_ms,
                "Schedule executed successfully"
            );
        }
        Err(e) => {
            let message = e.to_string();
            record.complete_failure(settled_at, message.clone());

            if let Err(e) = shared.history.record(&record).await {
                error!(execution_id = %record.id, error = %e, "Failed to persist execution record");
            }
            if let Err(e) = shared
                .cache
                .update_atomically(&schedule.id, |s| {
                    s.last_status = Some(LastStatus::Failed);
                    s.last_error = Some(message.clone());
                    if s.enabled {
                        s.next_run = next_occurrence(&s.cron_expression, settled_at);
                    }
                })
                .await
            {
                debug!(schedule_id = %schedule.id, error = %e, "Could not update schedule state");
            }

            if item.retry_count < MAX_RETRIES {
                let next_retry = item.retry_count + 1;
                let due = settled_at + retry_delay(next_retry);
                shared.queue.lock().await.push(QueueItem::retry(
                    schedule.id.clone(),
                    due,
                    next_retry,
                    item.manual,
                    settled_at,
                ));
                warn!(
                    schedule_id = %schedule.id,
                    execution_id = %record.id,
                    retry = next_retry,
                    due = %due,
                    error = %message,
                    "Job failed, retry queued"
                );
            } else {
                error!(
                    schedule_id = %schedule.id,
                    execution_id = %record.id,
                    error = %message,
                    "Job failed, retries exhausted"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{JobOutcome, RunnerError};
    use crate::scheduler::clock::SystemClock;
    use crate::scheduler::execution::ExecutionStatus;
    use crate::store::file::{FileExecutionStore, FileScheduleStore};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    struct StaticRunner {
        requests: StdMutex<Vec<JobRequest>>,
    }

    impl StaticRunner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                requests: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl JobRunner for StaticRunner {
        async fn run_job(&self, request: &JobRequest) -> std::result::Result<JobOutcome, RunnerError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(JobOutcome {
                output_path: Some("/tmp/report.pdf".to_string()),
                delivery_error: None,
            })
        }

        fn kind(&self) -> &'static str {
            "static"
        }
    }

    async fn start_engine(temp_dir: &TempDir, runner: Arc<dyn JobRunner>) -> SchedulerHandle {
        SchedulerService::new(SchedulerConfig {
            schedule_store: Arc::new(FileScheduleStore::new(temp_dir.path().join("schedules"))),
            execution_store: Arc::new(FileExecutionStore::new(temp_dir.path().join("executions"))),
            runner,
            clock: Arc::new(SystemClock::new()),
            max_concurrent: 2,
            tick_interval: Duration::from_millis(20),
        })
        .start()
        .await
        .unwrap()
    }

    fn daily_report(name: &str) -> NewSchedule {
        NewSchedule {
            name: name.to_string(),
            cron_expression: "0 9 * * *".to_string(),
            payload: json!({"report": "sales"}),
            ..Default::default()
        }
    }

    async fn settle(handle: &SchedulerHandle, expected_records: usize) {
        for _ in 0..200 {
            let records = handle.recent_executions(100).await.unwrap();
            if records.len() >= expected_records && records.iter().all(|r| r.is_settled()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("executions did not settle in time");
    }

    #[test]
    fn retry_delay_grows_linearly() {
        assert_eq!(retry_delay(1).num_seconds(), 60);
        assert_eq!(retry_delay(2).num_seconds(), 120);
        assert_eq!(retry_delay(3).num_seconds(), 180);
    }

    #[tokio::test]
    async fn create_schedule_arms_trigger() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_engine(&temp_dir, StaticRunner::new()).await;

        let schedule = handle.create_schedule(daily_report("Daily sales")).await.unwrap();
        assert!(schedule.next_run.is_some());

        for _ in 0..100 {
            if handle.get_status().await.armed_triggers == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.get_status().await.armed_triggers, 1);
        assert!(handle.get_schedule(&schedule.id).await.is_some());
    }

    #[tokio::test]
    async fn create_rejects_invalid_cron_without_persisting() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_engine(&temp_dir, StaticRunner::new()).await;

        let result = handle
            .create_schedule(NewSchedule {
                name: "Broken".to_string(),
                cron_expression: "whenever".to_string(),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(SchedulerError::InvalidCron(_))));
        assert!(handle.list_schedules(None).await.is_empty());
    }

    #[tokio::test]
    async fn manual_run_executes_job() {
        let temp_dir = TempDir::new().unwrap();
        let runner = StaticRunner::new();
        let handle = start_engine(&temp_dir, runner.clone()).await;

        let schedule = handle.create_schedule(daily_report("Daily sales")).await.unwrap();
        let execution_id = handle.execute_manually(&schedule.id).await.unwrap();
        settle(&handle, 1).await;

        let records = handle.execution_history(&schedule.id, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, execution_id);
        assert_eq!(records[0].status, ExecutionStatus::Success);
        assert!(records[0].manual);
        assert_eq!(records[0].output_path.as_deref(), Some("/tmp/report.pdf"));

        let updated = handle.get_schedule(&schedule.id).await.unwrap();
        assert_eq!(updated.last_status, Some(LastStatus::Success));
        assert!(updated.last_run.is_some());

        let requests = runner.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].schedule_name, "Daily sales");
        assert_eq!(requests[0].execution_id, execution_id);
    }

    #[tokio::test]
    async fn manual_run_unknown_schedule() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_engine(&temp_dir, StaticRunner::new()).await;

        let result = handle.execute_manually("sched_missing").await;
        assert!(matches!(result, Err(SchedulerError::ScheduleNotFound(_))));
    }

    #[tokio::test]
    async fn manual_run_of_disabled_schedule_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let runner = StaticRunner::new();
        let handle = start_engine(&temp_dir, runner.clone()).await;

        let schedule = handle.create_schedule(daily_report("Daily sales")).await.unwrap();
        handle.set_enabled(&schedule.id, false).await.unwrap();

        let execution_id = handle.execute_manually(&schedule.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(handle.get_execution(&execution_id).await.unwrap().is_none());
        assert!(handle.recent_executions(10).await.unwrap().is_empty());
        assert!(runner.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pause_and_resume_toggle_trigger() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_engine(&temp_dir, StaticRunner::new()).await;

        let schedule = handle.create_schedule(daily_report("Daily sales")).await.unwrap();

        let paused = handle.set_enabled(&schedule.id, false).await.unwrap();
        assert!(!paused.enabled);
        assert!(paused.next_run.is_none());
        for _ in 0..100 {
            if handle.get_status().await.armed_triggers == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.get_status().await.armed_triggers, 0);

        let resumed = handle.set_enabled(&schedule.id, true).await.unwrap();
        assert!(resumed.next_run.is_some());
        for _ in 0..100 {
            if handle.get_status().await.armed_triggers == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.get_status().await.armed_triggers, 1);
    }

    #[tokio::test]
    async fn delete_schedule_disarms_trigger() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_engine(&temp_dir, StaticRunner::new()).await;

        let schedule = handle.create_schedule(daily_report("Daily sales")).await.unwrap();
        assert!(handle.delete_schedule(&schedule.id).await.unwrap());
        assert!(!handle.delete_schedule(&schedule.id).await.unwrap());

        for _ in 0..100 {
            if handle.get_status().await.armed_triggers == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.get_status().await.armed_triggers, 0);
        assert!(handle.get_schedule(&schedule.id).await.is_none());
    }

    #[tokio::test]
    async fn retry_unknown_execution() {
        let temp_dir = TempDir::new().unwrap();
        let handle = start_engine(&temp_dir, StaticRunner::new()).await;

        let result = handle.retry_execution("exec_missing").await;
        assert!(matches!(result, Err(SchedulerError::ExecutionNotFound(_))));
    }
}
