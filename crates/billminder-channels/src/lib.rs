//! Delivery channels for BillMinder reminders.
//!
//! Every channel implements [`billminder_core::Notifier`]: one reminder, one
//! recipient, bounded by a timeout. Transport errors become
//! `SendOutcome::Failed`; anything that makes the channel unusable becomes
//! `SendOutcome::MissingConfig`.

pub mod email;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use billminder_core::config::NotifyConfig;
use billminder_core::{BillMinderError, Notifier, Reminder, Result, SendOutcome};

pub use email::EmailNotifier;
pub use webhook::WebhookNotifier;

/// Placeholder used when no channel is configured. Every run stops with
/// `missing_config`.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    fn channel_name(&self) -> &str {
        "none"
    }

    async fn init(&self) -> Result<()> {
        Err(BillMinderError::Config(
            "no notification channel configured (set notify.channel)".into(),
        ))
    }

    async fn send(&self, _reminder: &Reminder, _recipient: &str) -> SendOutcome {
        SendOutcome::MissingConfig("no notification channel configured".into())
    }
}

/// Build the notifier selected by `notify.channel`.
pub fn notifier_from_config(config: &NotifyConfig) -> Arc<dyn Notifier> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    match config.channel.as_str() {
        "smtp" => Arc::new(EmailNotifier::new(
            config.smtp.clone().unwrap_or_default(),
            timeout,
        )),
        "webhook" => Arc::new(WebhookNotifier::new(
            config.webhook.clone().unwrap_or_default(),
            timeout,
        )),
        _ => Arc::new(DisabledNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billminder_core::Obligation;

    #[tokio::test]
    async fn test_disabled_notifier_reports_missing_config() {
        let notifier = notifier_from_config(&NotifyConfig::default());
        assert_eq!(notifier.channel_name(), "none");
        assert!(notifier.init().await.is_err());

        let reminder = Reminder {
            obligation: Obligation::new("Rent", 900.0, 1).unwrap(),
            reason: billminder_core::DueReason::DueToday,
        };
        assert!(matches!(
            notifier.send(&reminder, "me@example.com").await,
            SendOutcome::MissingConfig(_)
        ));
    }

    #[test]
    fn test_channel_selection() {
        let mut config = NotifyConfig {
            channel: "smtp".into(),
            ..Default::default()
        };
        assert_eq!(notifier_from_config(&config).channel_name(), "smtp");
        config.channel = "webhook".into();
        assert_eq!(notifier_from_config(&config).channel_name(), "webhook");
    }
}
