//! Seams between the dispatch engine and delivery channels.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Reminder;

/// Result of one delivery attempt. Never an error: the engine decides what
/// each outcome means for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// This reminder did not go out; later reminders may.
    Failed(String),
    /// The channel cannot be used at all; the run must stop.
    MissingConfig(String),
}

/// A delivery channel for a single reminder to a single recipient.
///
/// Implementations must bound every attempt by a timeout and report it as
/// [`SendOutcome::Failed`] rather than hang.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name for logs (e.g. "smtp", "webhook").
    fn channel_name(&self) -> &str;

    /// Prepare the channel before the first send of a run. An `Err` means the
    /// channel is misconfigured and the run produces no log entries.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Deliver one reminder to `recipient`.
    async fn send(&self, reminder: &Reminder, recipient: &str) -> SendOutcome;
}
