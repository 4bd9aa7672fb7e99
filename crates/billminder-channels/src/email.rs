//! SMTP email channel via async `lettre`.
//!
//! Port 465 uses implicit TLS; any other port uses STARTTLS. Credentials are
//! attached only when a username is configured.

use std::time::Duration;

use async_trait::async_trait;
use billminder_core::config::SmtpConfig;
use billminder_core::{BillMinderError, Notifier, Reminder, Result, SendOutcome};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

pub struct EmailNotifier {
    config: SmtpConfig,
    timeout: Duration,
}

impl EmailNotifier {
    pub fn new(config: SmtpConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn sender(&self) -> Result<Mailbox> {
        if self.config.host.trim().is_empty() {
            return Err(BillMinderError::Config("notify.smtp.host is empty".into()));
        }
        self.config
            .from
            .parse()
            .map_err(|e| BillMinderError::Config(format!("Invalid notify.smtp.from: {e}")))
    }

    /// Build the reminder email.
    pub fn build_message(&self, reminder: &Reminder, recipient: &str) -> Result<Message> {
        let from = self.sender()?;
        let to: Mailbox = recipient
            .trim()
            .parse()
            .map_err(|e| BillMinderError::Config(format!("Invalid recipient '{recipient}': {e}")))?;
        Message::builder()
            .from(from)
            .to(to)
            .subject(reminder.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(reminder.body())
            .map_err(|e| BillMinderError::Notify(format!("Build email: {e}")))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let host = self.config.host.trim();
        let builder = if self.config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| BillMinderError::Config(format!("SMTP relay: {e}")))?
        .port(self.config.port)
        .timeout(Some(self.timeout));

        let builder = if self.config.username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
        };
        Ok(builder.build())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel_name(&self) -> &str {
        "smtp"
    }

    async fn init(&self) -> Result<()> {
        self.sender()?;
        self.transport()?;
        Ok(())
    }

    async fn send(&self, reminder: &Reminder, recipient: &str) -> SendOutcome {
        if recipient.trim().is_empty() {
            return SendOutcome::MissingConfig("no recipient address set".into());
        }
        let email = match self.build_message(reminder, recipient) {
            Ok(email) => email,
            Err(BillMinderError::Config(reason)) => return SendOutcome::MissingConfig(reason),
            Err(e) => return SendOutcome::Failed(e.to_string()),
        };
        let mailer = match self.transport() {
            Ok(mailer) => mailer,
            Err(e) => return SendOutcome::MissingConfig(e.to_string()),
        };

        match tokio::time::timeout(self.timeout, mailer.send(email)).await {
            Ok(Ok(_)) => {
                tracing::debug!("📤 Email sent to: {recipient}");
                SendOutcome::Delivered
            }
            Ok(Err(e)) => SendOutcome::Failed(format!("SMTP send: {e}")),
            Err(_) => SendOutcome::Failed(format!(
                "SMTP send timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }
}
