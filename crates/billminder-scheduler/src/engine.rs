//! Dispatch engine — one check-and-send pass over today's actionable bills.
//!
//! A run reloads the ledger, drops reminders already delivered today to the
//! same recipient, then sends the rest one by one with a fixed pause between
//! sends. Individual failures are logged and skipped; a misconfigured channel
//! stops the run. At most one run executes at a time; overlapping triggers
//! are dropped, not queued.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use billminder_core::{
    DispatchBookkeeping, DispatchLogEntry, DispatchStatus, LogStatus, Notifier, Reminder, Result,
    SendOutcome,
};
use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::watch;

use crate::clock::Clock;
use crate::due;
use crate::store::StateStore;

/// Default pause between two sends of the same run.
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(2500);

/// Summary of one `run_check` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub status: DispatchStatus,
    pub delivered: usize,
    pub failed: usize,
    /// Another run was in progress; this one did nothing.
    pub busy: bool,
}

impl RunReport {
    fn quiet(status: DispatchStatus) -> Self {
        Self {
            status,
            delivered: 0,
            failed: 0,
            busy: false,
        }
    }
}

/// Releases the run flag when dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Obligations this process delivered on `day` to `recipient`, kept even when
/// the matching log entry could not be written.
#[derive(Debug, Default)]
struct DeliveredToday {
    day: Option<NaiveDate>,
    recipient: String,
    ids: HashSet<String>,
}

pub struct DispatchEngine {
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    send_delay: Duration,
    status: watch::Sender<DispatchStatus>,
    running: AtomicBool,
    delivered: Mutex<DeliveredToday>,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (status, _) = watch::channel(DispatchStatus::Idle);
        Self {
            store,
            notifier,
            clock,
            send_delay: DEFAULT_SEND_DELAY,
            status,
            running: AtomicBool::new(false),
            delivered: Mutex::new(DeliveredToday::default()),
        }
    }

    /// Override the pause between sends.
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Current dispatch status.
    pub fn status(&self) -> DispatchStatus {
        *self.status.borrow()
    }

    /// Watch status transitions.
    pub fn subscribe(&self) -> watch::Receiver<DispatchStatus> {
        self.status.subscribe()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn bookkeeping(&self) -> Result<DispatchBookkeeping> {
        Ok(self.store.load()?.bookkeeping)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(&self.running))
    }

    fn set_status(&self, status: DispatchStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::debug!(from = %previous, to = %status, "dispatch status changed");
        }
    }

    /// Run one check-and-send pass.
    ///
    /// Store failures abort the run with `Err`; delivery problems never do.
    pub async fn run_check(&self) -> Result<RunReport> {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("⏭️ Dispatch run already in progress, skipping trigger");
            return Ok(RunReport {
                busy: true,
                ..RunReport::quiet(self.status())
            });
        };

        let now = self.clock.now();
        let today = now.date();
        let state = self.store.load()?;

        let actionable = due::reminders(&state.obligations, now);
        if actionable.is_empty() {
            self.status.send_if_modified(|s| {
                if matches!(*s, DispatchStatus::Error | DispatchStatus::MissingConfig) {
                    *s = DispatchStatus::Idle;
                    true
                } else {
                    false
                }
            });
            tracing::debug!("Nothing actionable on {today}");
            return Ok(RunReport::quiet(self.status()));
        }

        let recipient = state.recipient.clone().unwrap_or_default();
        // A never-recorded recipient is not a change; only a different address resets dedup.
        let recipient_changed = state
            .bookkeeping
            .last_dispatch_recipient
            .as_deref()
            .is_some_and(|previous| previous != recipient);
        let mut already_sent: HashSet<String> = if recipient_changed {
            tracing::info!(recipient = %recipient, "📮 Recipient changed, resending today's reminders");
            HashSet::new()
        } else {
            state.delivered_on(today)
        };
        already_sent.extend(self.delivered_in_process(today, &recipient));

        let to_send: Vec<Reminder> = actionable
            .into_iter()
            .filter(|r| !already_sent.contains(&r.obligation.id))
            .collect();
        if to_send.is_empty() {
            self.status.send_if_modified(|s| {
                if matches!(*s, DispatchStatus::Sent | DispatchStatus::AlreadySent) {
                    false
                } else {
                    *s = DispatchStatus::AlreadySent;
                    true
                }
            });
            tracing::debug!("All actionable reminders already delivered on {today}");
            return Ok(RunReport::quiet(self.status()));
        }

        self.set_status(DispatchStatus::Sending);
        tracing::info!(
            "📣 Sending {} reminder(s) via {}",
            to_send.len(),
            self.notifier.channel_name()
        );

        if let Err(e) = self.notifier.init().await {
            tracing::warn!("⚠️ Notifier not configured: {e}");
            self.set_status(DispatchStatus::MissingConfig);
            return Ok(RunReport::quiet(DispatchStatus::MissingConfig));
        }

        let mut delivered = 0;
        let mut failed = 0;
        let mut misconfigured = false;
        let mut unrecorded = 0usize;

        for (i, reminder) in to_send.iter().enumerate() {
            let name = reminder.obligation.name.as_str();
            match self.notifier.send(reminder, &recipient).await {
                SendOutcome::MissingConfig(reason) => {
                    tracing::warn!(obligation = name, "⚠️ Notifier not configured: {reason}");
                    misconfigured = true;
                    break;
                }
                SendOutcome::Delivered => {
                    tracing::info!(obligation = name, recipient = %recipient, "✅ Reminder sent");
                    delivered += 1;
                    self.remember_delivery(today, &recipient, &reminder.obligation.id);
                    if self.record(reminder, now, LogStatus::Success).is_err() {
                        unrecorded += 1;
                    }
                }
                SendOutcome::Failed(reason) => {
                    tracing::warn!(obligation = name, "❌ Reminder failed: {reason}");
                    failed += 1;
                    if self.record(reminder, now, LogStatus::Failed).is_err() {
                        unrecorded += 1;
                    }
                }
            }

            if i + 1 < to_send.len() && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
        }

        let status = if misconfigured {
            DispatchStatus::MissingConfig
        } else if failed > 0 || unrecorded > 0 {
            DispatchStatus::Error
        } else {
            let bookkeeping = DispatchBookkeeping {
                last_dispatch_date: Some(today),
                last_dispatch_recipient: Some(recipient.clone()),
            };
            if let Err(e) = self.store.save_bookkeeping(&bookkeeping) {
                tracing::warn!("⚠️ Failed to save dispatch bookkeeping: {e}");
            }
            DispatchStatus::Sent
        };
        self.set_status(status);

        tracing::info!(
            status = %status,
            unrecorded,
            "Dispatch run finished: {delivered} delivered, {failed} failed"
        );
        Ok(RunReport {
            status,
            delivered,
            failed,
            busy: false,
        })
    }

    /// Append a log entry stamped on the run's day. A send that finishes
    /// after midnight is stamped with the run's start time instead.
    fn record(&self, reminder: &Reminder, started: NaiveDateTime, status: LogStatus) -> Result<()> {
        let finished = self.clock.now();
        let sent_at = if finished.date() == started.date() {
            finished
        } else {
            started
        };
        let entry = DispatchLogEntry::record(&reminder.obligation, sent_at, status);
        self.store.append_dispatch(&entry).inspect_err(|e| {
            tracing::warn!(
                obligation = reminder.obligation.name.as_str(),
                "⚠️ Failed to append dispatch log entry: {e}"
            );
        })
    }

    fn remember_delivery(&self, day: NaiveDate, recipient: &str, id: &str) {
        let mut delivered = self.delivered.lock().unwrap_or_else(|e| e.into_inner());
        if delivered.day != Some(day) || delivered.recipient != recipient {
            *delivered = DeliveredToday {
                day: Some(day),
                recipient: recipient.to_string(),
                ids: HashSet::new(),
            };
        }
        delivered.ids.insert(id.to_string());
    }

    fn delivered_in_process(&self, day: NaiveDate, recipient: &str) -> HashSet<String> {
        let delivered = self.delivered.lock().unwrap_or_else(|e| e.into_inner());
        if delivered.day == Some(day) && delivered.recipient == recipient {
            delivered.ids.clone()
        } else {
            HashSet::new()
        }
    }
}
