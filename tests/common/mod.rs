//! Common test utilities.
//!
//! Builders for a file-backed engine in a temp directory plus scripted
//! [`JobRunner`] doubles that let tests decide how each attempt settles.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::sync::Semaphore;

use reportd::runner::{JobOutcome, JobRequest, JobRunner, RunnerError};
use reportd::scheduler::{
    Clock, ManualClock, NewSchedule, SchedulerConfig, SchedulerHandle, SchedulerService,
    SystemClock,
};
use reportd::store::file::{FileExecutionStore, FileScheduleStore};

/// Start an engine over file stores rooted in `temp_dir`.
pub async fn start_engine(
    temp_dir: &TempDir,
    runner: Arc<dyn JobRunner>,
    clock: Arc<dyn Clock>,
    max_concurrent: usize,
) -> SchedulerHandle {
    SchedulerService::new(SchedulerConfig {
        schedule_store: Arc::new(FileScheduleStore::new(temp_dir.path().join("schedules"))),
        execution_store: Arc::new(FileExecutionStore::new(temp_dir.path().join("executions"))),
        runner,
        clock,
        max_concurrent,
        tick_interval: Duration::from_millis(20),
    })
    .start()
    .await
    .expect("engine failed to start")
}

/// Engine with the real clock, as the daemon runs it.
pub async fn start_realtime_engine(
    temp_dir: &TempDir,
    runner: Arc<dyn JobRunner>,
    max_concurrent: usize,
) -> SchedulerHandle {
    start_engine(temp_dir, runner, Arc::new(SystemClock::new()), max_concurrent).await
}

/// Engine driven by a [`ManualClock`] so retry delays and retention
/// cutoffs can be stepped deterministically.
pub async fn start_manual_engine(
    temp_dir: &TempDir,
    runner: Arc<dyn JobRunner>,
    start: DateTime<Utc>,
    max_concurrent: usize,
) -> (SchedulerHandle, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    let handle = start_engine(temp_dir, runner, clock.clone(), max_concurrent).await;
    (handle, clock)
}

/// A schedule that will not fire by itself during a test.
pub fn dormant_schedule(name: &str) -> NewSchedule {
    NewSchedule {
        name: name.to_string(),
        // Fires once, far in the future.
        cron_expression: "0 0 9 1 1 * 2099".to_string(),
        payload: serde_json::json!({"report": "sales"}),
        ..Default::default()
    }
}

/// A schedule that fires every second on the real clock.
pub fn every_second_schedule(name: &str) -> NewSchedule {
    NewSchedule {
        name: name.to_string(),
        cron_expression: "* * * * * *".to_string(),
        payload: serde_json::json!({"report": "sales"}),
        ..Default::default()
    }
}

/// A classic daily 09:00 report schedule.
pub fn daily_schedule(name: &str) -> NewSchedule {
    NewSchedule {
        name: name.to_string(),
        cron_expression: "0 9 * * *".to_string(),
        payload: serde_json::json!({"report": "sales", "time_range": {"last_days": 1}}),
        ..Default::default()
    }
}

/// Runner that fails the first `failures` attempts and succeeds after.
pub struct FlakyRunner {
    failures: usize,
    attempts: AtomicUsize,
}

impl FlakyRunner {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            attempts: AtomicUsize::new(0),
        })
    }

    /// Runner that never succeeds.
    pub fn always_failing() -> Arc<Self> {
        Self::new(usize::MAX)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRunner for FlakyRunner {
    async fn run_job(&self, _request: &JobRequest) -> Result<JobOutcome, RunnerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            Err(RunnerError::Failed("data source offline".to_string()))
        } else {
            Ok(JobOutcome {
                output_path: Some("/tmp/report.pdf".to_string()),
                delivery_error: None,
            })
        }
    }

    fn kind(&self) -> &'static str {
        "flaky"
    }
}

/// Runner whose jobs block until the test releases them, tracking how many
/// ran at once.
pub struct GatedRunner {
    release: Semaphore,
    current: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
}

impl GatedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            release: Semaphore::new(0),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
        })
    }

    /// Let `n` blocked (or future) jobs finish.
    pub fn release(&self, n: usize) {
        self.release.add_permits(n);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Most jobs ever observed in flight at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRunner for GatedRunner {
    async fn run_job(&self, _request: &JobRequest) -> Result<JobOutcome, RunnerError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now_running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);

        self.release
            .acquire()
            .await
            .expect("release gate closed")
            .forget();
        self.current.fetch_sub(1, Ordering::SeqCst);

        Ok(JobOutcome {
            output_path: Some("/tmp/report.pdf".to_string()),
            delivery_error: None,
        })
    }

    fn kind(&self) -> &'static str {
        "gated"
    }
}
