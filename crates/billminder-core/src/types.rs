//! Domain records — obligations, the dispatch log and dispatch bookkeeping.
//!
//! All timestamps are local wall-clock times (`NaiveDateTime`): settlement and
//! deduplication are defined on the user's calendar, not on UTC days.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{BillMinderError, Result};

/// A bill that recurs every month on a nominal day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Obligation {
    pub id: String,
    pub name: String,
    pub amount: f64,
    /// Nominal day of month, 1-31. Not checked against the month's length.
    pub due_day: u32,
    /// Set when the user marks the bill paid, cleared when un-marked.
    #[serde(default)]
    pub last_settled_at: Option<NaiveDateTime>,
}

impl Obligation {
    /// Create a validated obligation with a fresh id.
    pub fn new(name: &str, amount: f64, due_day: u32) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BillMinderError::Validation("name must not be empty".into()));
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(BillMinderError::Validation(format!(
                "amount must be positive, got {amount}"
            )));
        }
        if !(1..=31).contains(&due_day) {
            return Err(BillMinderError::Validation(format!(
                "due day must be 1-31, got {due_day}"
            )));
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            amount,
            due_day,
            last_settled_at: None,
        })
    }

    /// Settled for the current period iff the settlement falls in `now`'s month and year.
    pub fn is_settled(&self, now: NaiveDateTime) -> bool {
        self.last_settled_at
            .is_some_and(|at| at.year() == now.year() && at.month() == now.month())
    }

    pub fn settle(&mut self, now: NaiveDateTime) {
        self.last_settled_at = Some(now);
    }

    pub fn unsettle(&mut self) {
        self.last_settled_at = None;
    }
}

/// Why an obligation is actionable on a given day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DueReason {
    DueToday,
    DueTomorrow,
    Overdue,
}

impl std::fmt::Display for DueReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DueReason::DueToday => write!(f, "due today"),
            DueReason::DueTomorrow => write!(f, "due tomorrow"),
            DueReason::Overdue => write!(f, "overdue"),
        }
    }
}

/// An actionable obligation, as handed to a notifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Reminder {
    pub obligation: Obligation,
    pub reason: DueReason,
}

impl Reminder {
    pub fn subject(&self) -> String {
        format!("Payment reminder: {}", self.obligation.name)
    }

    pub fn body(&self) -> String {
        format!(
            "{} ({:.2}) is {}. It recurs on day {} of each month.\n\n\
             Mark it as paid in BillMinder to stop further reminders this month.",
            self.obligation.name, self.obligation.amount, self.reason, self.obligation.due_day
        )
    }
}

/// Outcome recorded for one completed send attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Failed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Success => "success",
            LogStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(LogStatus::Success),
            "failed" => Some(LogStatus::Failed),
            _ => None,
        }
    }
}

/// Immutable audit record of one send attempt. `name` and `amount` are
/// snapshots taken at send time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchLogEntry {
    pub id: String,
    pub obligation_id: Option<String>,
    pub amount: f64,
    pub name: String,
    pub sent_at: NaiveDateTime,
    pub status: LogStatus,
}

impl DispatchLogEntry {
    pub fn record(obligation: &Obligation, sent_at: NaiveDateTime, status: LogStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            obligation_id: Some(obligation.id.clone()),
            amount: obligation.amount,
            name: obligation.name.clone(),
            sent_at,
            status,
        }
    }
}

/// Process-wide record of the last day that had a successful dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DispatchBookkeeping {
    pub last_dispatch_date: Option<NaiveDate>,
    pub last_dispatch_recipient: Option<String>,
}

/// Everything BillMinder persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerState {
    #[serde(default)]
    pub obligations: Vec<Obligation>,
    #[serde(default)]
    pub dispatch_log: Vec<DispatchLogEntry>,
    #[serde(default)]
    pub bookkeeping: DispatchBookkeeping,
    /// Address reminders go to.
    #[serde(default)]
    pub recipient: Option<String>,
}

impl LedgerState {
    pub fn obligation_mut(&mut self, id: &str) -> Result<&mut Obligation> {
        self.obligations
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| BillMinderError::NotFound(format!("obligation {id}")))
    }

    pub fn remove_obligation(&mut self, id: &str) -> Result<Obligation> {
        let pos = self
            .obligations
            .iter()
            .position(|o| o.id == id)
            .ok_or_else(|| BillMinderError::NotFound(format!("obligation {id}")))?;
        Ok(self.obligations.remove(pos))
    }

    /// Ids of obligations with a successful log entry on `day`.
    pub fn delivered_on(&self, day: NaiveDate) -> HashSet<String> {
        self.dispatch_log
            .iter()
            .filter(|e| e.status == LogStatus::Success && e.sent_at.date() == day)
            .filter_map(|e| e.obligation_id.clone())
            .collect()
    }
}

/// Observability signal for the dispatch engine. Not persisted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    #[default]
    Idle,
    Sending,
    Sent,
    AlreadySent,
    Error,
    MissingConfig,
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchStatus::Idle => write!(f, "idle"),
            DispatchStatus::Sending => write!(f, "sending"),
            DispatchStatus::Sent => write!(f, "sent"),
            DispatchStatus::AlreadySent => write!(f, "already_sent"),
            DispatchStatus::Error => write!(f, "error"),
            DispatchStatus::MissingConfig => write!(f, "missing_config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_new_validates_input() {
        assert!(Obligation::new("Rent", 1200.0, 1).is_ok());
        assert!(Obligation::new("  ", 10.0, 1).is_err());
        assert!(Obligation::new("Rent", 0.0, 1).is_err());
        assert!(Obligation::new("Rent", -5.0, 1).is_err());
        assert!(Obligation::new("Rent", f64::NAN, 1).is_err());
        assert!(Obligation::new("Rent", 10.0, 0).is_err());
        assert!(Obligation::new("Rent", 10.0, 32).is_err());
    }

    #[test]
    fn test_settled_only_within_same_month_and_year() {
        let mut ob = Obligation::new("Netflix", 15.99, 5).unwrap();
        assert!(!ob.is_settled(at(2026, 3, 10)));

        ob.settle(at(2026, 3, 2));
        assert!(ob.is_settled(at(2026, 3, 31)));
        assert!(!ob.is_settled(at(2026, 4, 1)));
        assert!(!ob.is_settled(at(2027, 3, 2)));

        ob.unsettle();
        assert!(!ob.is_settled(at(2026, 3, 10)));
    }

    #[test]
    fn test_delivered_on_ignores_failures_and_other_days() {
        let ob = Obligation::new("Gym", 30.0, 3).unwrap();
        let mut state = LedgerState::default();
        state.dispatch_log.push(DispatchLogEntry::record(&ob, at(2026, 3, 3), LogStatus::Failed));
        state.dispatch_log.push(DispatchLogEntry::record(&ob, at(2026, 3, 2), LogStatus::Success));
        assert!(state.delivered_on(at(2026, 3, 3).date()).is_empty());

        state.dispatch_log.push(DispatchLogEntry::record(&ob, at(2026, 3, 3), LogStatus::Success));
        assert!(state.delivered_on(at(2026, 3, 3).date()).contains(&ob.id));
    }

    #[test]
    fn test_remove_unknown_obligation() {
        let mut state = LedgerState::default();
        assert!(matches!(
            state.remove_obligation("nope"),
            Err(BillMinderError::NotFound(_))
        ));
    }

    #[test]
    fn test_reminder_text_mentions_amount_and_reason() {
        let reminder = Reminder {
            obligation: Obligation::new("Electricity", 84.5, 12).unwrap(),
            reason: DueReason::Overdue,
        };
        assert_eq!(reminder.subject(), "Payment reminder: Electricity");
        let body = reminder.body();
        assert!(body.contains("84.50"));
        assert!(body.contains("is overdue"));
        assert!(body.contains("day 12"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&DispatchStatus::MissingConfig).unwrap();
        assert_eq!(json, "\"missing_config\"");
        assert_eq!(DispatchStatus::AlreadySent.to_string(), "already_sent");
    }
}
