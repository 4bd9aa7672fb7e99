//! Generic HTTP webhook channel — POSTs a JSON reminder.

use std::time::Duration;

use async_trait::async_trait;
use billminder_core::config::WebhookConfig;
use billminder_core::{BillMinderError, Notifier, Reminder, Result, SendOutcome};

pub struct WebhookNotifier {
    config: WebhookConfig,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig, timeout: Duration) -> Self {
        Self {
            config,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// JSON body for one reminder.
    pub fn payload(reminder: &Reminder, recipient: &str) -> serde_json::Value {
        let ob = &reminder.obligation;
        serde_json::json!({
            "recipient": recipient,
            "subject": reminder.subject(),
            "body": reminder.body(),
            "reason": reminder.reason,
            "obligation": {
                "id": ob.id,
                "name": ob.name,
                "amount": ob.amount,
                "due_day": ob.due_day,
            },
        })
    }

    fn url(&self) -> Result<reqwest::Url> {
        let url = self.config.url.trim();
        if url.is_empty() {
            return Err(BillMinderError::Config("notify.webhook.url is empty".into()));
        }
        reqwest::Url::parse(url)
            .map_err(|e| BillMinderError::Config(format!("Invalid notify.webhook.url: {e}")))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel_name(&self) -> &str {
        "webhook"
    }

    async fn init(&self) -> Result<()> {
        self.url().map(|_| ())
    }

    async fn send(&self, reminder: &Reminder, recipient: &str) -> SendOutcome {
        let url = match self.url() {
            Ok(url) => url,
            Err(e) => return SendOutcome::MissingConfig(e.to_string()),
        };
        if recipient.trim().is_empty() {
            return SendOutcome::MissingConfig("no recipient address set".into());
        }

        let mut req = self
            .client
            .post(url)
            .json(&Self::payload(reminder, recipient))
            .timeout(self.timeout);
        for (key, value) in &self.config.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("✅ Webhook accepted reminder: {}", reminder.obligation.name);
                SendOutcome::Delivered
            }
            Ok(resp) => SendOutcome::Failed(format!("Webhook error {}", resp.status())),
            Err(e) if e.is_timeout() => SendOutcome::Failed(format!(
                "Webhook timed out after {}s",
                self.timeout.as_secs()
            )),
            Err(e) => SendOutcome::Failed(format!("Webhook send failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billminder_core::{DueReason, Obligation};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn reminder() -> Reminder {
        Reminder {
            obligation: Obligation::new("Internet", 49.0, 12).unwrap(),
            reason: DueReason::Overdue,
        }
    }

    /// One-shot HTTP server answering every request with `status_line`.
    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let response = format!("{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/hook")
    }

    fn notifier(url: String) -> WebhookNotifier {
        WebhookNotifier::new(
            WebhookConfig {
                url,
                headers: vec![("X-Token".into(), "secret".into())],
            },
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_payload_shape() {
        let payload = WebhookNotifier::payload(&reminder(), "me@example.com");
        assert_eq!(payload["recipient"], "me@example.com");
        assert_eq!(payload["reason"], "overdue");
        assert_eq!(payload["obligation"]["name"], "Internet");
        assert_eq!(payload["obligation"]["due_day"], 12);
        assert_eq!(payload["subject"], "Payment reminder: Internet");
    }

    #[tokio::test]
    async fn test_empty_url_is_missing_config() {
        let notifier = notifier(String::new());
        assert!(notifier.init().await.is_err());
        assert!(matches!(
            notifier.send(&reminder(), "me@example.com").await,
            SendOutcome::MissingConfig(_)
        ));
    }

    #[tokio::test]
    async fn test_success_status_is_delivered() {
        let url = serve_once("HTTP/1.1 200 OK").await;
        let outcome = notifier(url).send(&reminder(), "me@example.com").await;
        assert_eq!(outcome, SendOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_error_status_is_failed() {
        let url = serve_once("HTTP/1.1 503 Service Unavailable").await;
        let outcome = notifier(url).send(&reminder(), "me@example.com").await;
        assert!(matches!(outcome, SendOutcome::Failed(reason) if reason.contains("503")));
    }
}
