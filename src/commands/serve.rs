//! Scheduler daemon command implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::signal;
use tracing::{info, warn};

use reportd::config::{self, Config};
use reportd::runner::CommandRunner;
use reportd::scheduler::{SchedulerConfig, SchedulerService, SystemClock};
use reportd::store::file::{FileExecutionStore, FileScheduleStore};

pub async fn run(config_path: &str, data_dir_override: Option<&Path>) -> Result<()> {
    let mut config = Config::load(config_path).await?;

    // CLI overrides config
    if let Some(dir) = data_dir_override {
        config.data_dir = Some(dir.to_path_buf());
    }

    // Resolve paths relative to the config file
    let config_path_ref = Path::new(config_path);
    let data_dir = config
        .data_dir
        .as_deref()
        .unwrap_or(Path::new(config::DEFAULT_DATA_DIR));
    let data_dir = config::resolve_path(config_path_ref, data_dir);

    let Some(command) = config.runner.command.clone() else {
        bail!("runner.command is not set in '{config_path}'");
    };
    // A bare command name is looked up on PATH; anything with a path
    // separator is anchored at the config file directory.
    let command = if command.components().count() > 1 {
        config::resolve_path(config_path_ref, &command)
    } else {
        command
    };
    let working_dir = config
        .runner
        .working_dir
        .as_deref()
        .map(|p| config::resolve_path(config_path_ref, p));

    let runner = CommandRunner::new(
        command.clone(),
        config.runner.args.clone(),
        working_dir,
        Duration::from_secs(config.runner.timeout_seconds),
    );

    let schedule_store = Arc::new(FileScheduleStore::new(data_dir.join(config::SCHEDULES_DIR)));
    let execution_store = Arc::new(FileExecutionStore::new(
        data_dir.join(config::EXECUTIONS_DIR),
    ));

    info!(
        data_dir = %data_dir.display(),
        runner = %command.display(),
        max_concurrent = config.scheduler.max_concurrent_jobs,
        "Starting scheduler"
    );
    let handle = SchedulerService::new(SchedulerConfig {
        schedule_store,
        execution_store,
        runner: Arc::new(runner),
        clock: Arc::new(SystemClock::new()),
        max_concurrent: config.scheduler.max_concurrent_jobs,
        tick_interval: Duration::from_millis(config.scheduler.tick_interval_ms),
    })
    .start()
    .await
    .context("failed to start scheduler")?;

    shutdown_signal().await;

    handle.shutdown().await;

    // Let in-flight jobs settle before the process exits; stragglers are
    // recovered as interrupted on the next start.
    for _ in 0..100 {
        if handle.get_status().await.running == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    info!("Daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
