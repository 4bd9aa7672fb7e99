//! Daily dispatch scheduler — one armed timer per process.
//!
//! The check runs once a day at a fixed local hour. If the process starts (or
//! wakes) after that hour and no successful dispatch happened today, the check
//! runs immediately. The timer is single-shot: after every run the loop
//! re-plans from the current clock and bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use billminder_core::{DispatchBookkeeping, Obligation};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::DispatchEngine;
use crate::store::StateStore;

/// Default local hour of the daily dispatch slot.
pub const DEFAULT_DISPATCH_HOUR: u32 = 6;

/// When the next check should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The slot is open and nothing went out today: catch up now.
    Now,
    At(NaiveDateTime),
}

/// The dispatch slot on `day`.
pub fn dispatch_target(day: NaiveDate, hour: u32) -> NaiveDateTime {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    day.and_time(time)
}

/// Decide the next wake-up.
///
/// `last_attempt` is the day of the last run this process triggered on its
/// own; a run that did not produce a successful day is not repeated until the
/// next slot.
pub fn plan_next_wake(
    now: NaiveDateTime,
    bookkeeping: &DispatchBookkeeping,
    dispatch_hour: u32,
    last_attempt: Option<NaiveDate>,
) -> Wake {
    let today = now.date();
    let target = dispatch_target(today, dispatch_hour);

    if bookkeeping.last_dispatch_date == Some(today) || last_attempt == Some(today) {
        let tomorrow = today
            .succ_opt()
            .map_or(target, |d| dispatch_target(d, dispatch_hour));
        return Wake::At(tomorrow);
    }
    if now >= target {
        Wake::Now
    } else {
        Wake::At(target)
    }
}

pub struct DispatchScheduler {
    engine: Arc<DispatchEngine>,
    dispatch_hour: u32,
}

impl DispatchScheduler {
    pub fn new(engine: Arc<DispatchEngine>, dispatch_hour: u32) -> Self {
        Self {
            engine,
            dispatch_hour,
        }
    }

    /// Start the loop on the current tokio runtime.
    pub fn spawn(self) -> SchedulerHandle {
        let reschedule = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(reschedule.clone(), shutdown_rx));
        SchedulerHandle {
            reschedule,
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }

    async fn run(self, reschedule: Arc<Notify>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "⏰ Scheduler started (daily check at {:02}:00)",
            self.dispatch_hour
        );
        let mut last_attempt: Option<NaiveDate> = None;

        loop {
            let now = self.engine.clock().now();
            let bookkeeping = self.engine.bookkeeping().unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to read dispatch bookkeeping: {e}");
                DispatchBookkeeping::default()
            });

            match plan_next_wake(now, &bookkeeping, self.dispatch_hour, last_attempt) {
                Wake::Now => {
                    tracing::info!("⏩ Dispatch slot already open, catching up");
                    last_attempt = Some(now.date());
                    self.fire().await;
                }
                Wake::At(at) => {
                    let delay = (at - now).to_std().unwrap_or(Duration::ZERO);
                    tracing::debug!("Next dispatch check at {at} (in {}s)", delay.as_secs());
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            last_attempt = Some(self.engine.clock().now().date());
                            self.fire().await;
                        }
                        _ = reschedule.notified() => {
                            tracing::debug!("Inputs changed, re-planning dispatch");
                            last_attempt = None;
                        }
                        _ = shutdown.changed() => {
                            tracing::info!("⏹️ Scheduler stopped");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn fire(&self) {
        match self.engine.run_check().await {
            Ok(report) if report.busy => {}
            Ok(report) => tracing::info!(
                status = %report.status,
                "📬 Daily check done ({} delivered, {} failed)",
                report.delivered,
                report.failed
            ),
            Err(e) => tracing::warn!("⚠️ Daily check failed: {e}"),
        }
    }
}

/// Control handle for a spawned scheduler. Dropping it cancels the armed timer.
pub struct SchedulerHandle {
    reschedule: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Obligations or recipient changed: drop the armed timer and plan again.
    pub fn reschedule(&self) {
        self.reschedule.notify_one();
    }

    /// Stop after any in-flight run completes.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Poll the store and re-plan whenever the obligation list or the recipient
/// changes. Runs until the surrounding task is dropped.
pub async fn watch_ledger(store: Arc<dyn StateStore>, handle: &SchedulerHandle, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last: Option<(Vec<Obligation>, Option<String>)> = None;

    loop {
        interval.tick().await;
        let state = match store.load() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("⚠️ Failed to poll ledger: {e}");
                continue;
            }
        };
        let inputs = (state.obligations, state.recipient);
        if last.as_ref().is_some_and(|prev| *prev != inputs) {
            tracing::info!("🔄 Obligations or recipient changed, re-planning dispatch");
            handle.reschedule();
        }
        last = Some(inputs);
    }
}
