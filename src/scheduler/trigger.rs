//! Cron trigger timers.
//!
//! One armed timer per enabled schedule. A timer sleeps until its fire
//! time, emits a [`TriggerEvent`] to the service loop, and unregisters
//! itself; the service re-arms the schedule for the following occurrence.
//! Re-arming a schedule always cancels the previous timer first, so a
//! schedule never has two live timers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::debug;

use super::schedule::ScheduleId;

/// A timer fired for a schedule.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub schedule_id: ScheduleId,
    /// The occurrence the timer was armed for.
    pub fire_at: DateTime<Utc>,
}

struct TimerSlot {
    generation: u64,
    // Dropping the sender cancels the timer task.
    _cancel_tx: oneshot::Sender<()>,
}

/// Arms and cancels per-schedule timers.
#[derive(Clone)]
pub struct TriggerEngine {
    timers: Arc<RwLock<HashMap<ScheduleId, TimerSlot>>>,
    event_tx: mpsc::Sender<TriggerEvent>,
    next_generation: Arc<AtomicU64>,
}

impl TriggerEngine {
    pub fn new(event_tx: mpsc::Sender<TriggerEvent>) -> Self {
        Self {
            timers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Arm a timer for `schedule_id` at `fire_at`, replacing any existing
    /// timer for the schedule. Past fire times fire immediately.
    pub async fn arm(&self, schedule_id: &str, fire_at: DateTime<Utc>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        // Inserting drops the previous sender, which wakes and cancels the
        // previous timer task.
        self.timers.write().await.insert(
            schedule_id.to_string(),
            TimerSlot {
                generation,
                _cancel_tx: cancel_tx,
            },
        );

        let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(schedule_id = %schedule_id, fire_at = %fire_at, "Trigger armed");

        let timers = Arc::clone(&self.timers);
        let event_tx = self.event_tx.clone();
        let schedule_id = schedule_id.to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel_rx => return,
            }

            {
                let mut timers = timers.write().await;
                match timers.get(&schedule_id) {
                    // A fired timer only removes its own registration; a
                    // concurrent re-arm may already have replaced it.
                    Some(slot) if slot.generation == generation => {
                        timers.remove(&schedule_id);
                    }
                    _ => return,
                }
            }

            if event_tx
                .send(TriggerEvent {
                    schedule_id,
                    fire_at,
                })
                .await
                .is_err()
            {
                debug!("Trigger listener dropped, discarding fire event");
            }
        });
    }

    /// Cancel the timer for a schedule, if armed.
    pub async fn disarm(&self, schedule_id: &str) -> bool {
        let removed = self.timers.write().await.remove(schedule_id).is_some();
        if removed {
            debug!(schedule_id = %schedule_id, "Trigger disarmed");
        }
        removed
    }

    /// Cancel every armed timer.
    pub async fn disarm_all(&self) {
        self.timers.write().await.clear();
    }

    pub async fn is_armed(&self, schedule_id: &str) -> bool {
        self.timers.read().await.contains_key(schedule_id)
    }

    pub async fn armed_count(&self) -> usize {
        self.timers.read().await.len()
    }
}
