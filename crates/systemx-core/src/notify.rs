//! Operator notifications: webhook delivery plus per-key cooldown debouncing.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::adapters::{NotificationAdapter, Severity};
use crate::{Error, Result};

/// Posts alerts to a Slack-compatible incoming webhook. Best effort: callers
/// never block trading on a failed delivery.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
    username: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
            username: "System X".to_string(),
        }
    }
}

#[async_trait]
impl NotificationAdapter for WebhookNotifier {
    async fn notify(&self, severity: Severity, message: &str) -> Result<()> {
        let payload = json!({
            "text": format!("*[{severity}]* {message}"),
            "username": self.username,
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Notifier that only writes structured logs. Used when no webhook is
/// configured and in tests.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationAdapter for LogNotifier {
    async fn notify(&self, severity: Severity, message: &str) -> Result<()> {
        match severity {
            Severity::Info => info!(target: "systemx::alerts", "{message}"),
            Severity::Warning => warn!(target: "systemx::alerts", "{message}"),
            Severity::Critical => error!(target: "systemx::alerts", "{message}"),
        }
        Ok(())
    }
}

/// Debouncing wrapper: suppresses repeated alerts for the same key within a
/// cooldown window. Critical alerts bypass the cooldown.
pub struct CooldownNotifier<N> {
    inner: N,
    cooldown: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl<N: NotificationAdapter> CooldownNotifier<N> {
    pub fn new(inner: N, cooldown: Duration) -> Self {
        Self {
            inner,
            cooldown,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Send keyed by `alert_key`; suppressed duplicates return Ok.
    pub async fn notify_keyed(
        &self,
        alert_key: &str,
        severity: Severity,
        message: &str,
    ) -> Result<()> {
        if severity != Severity::Critical {
            let mut last_sent = self.last_sent.lock().await;
            if let Some(sent_at) = last_sent.get(alert_key) {
                if sent_at.elapsed() < self.cooldown {
                    debug!(alert_key, "Notification suppressed by cooldown");
                    return Ok(());
                }
            }
            last_sent.insert(alert_key.to_string(), Instant::now());
        }

        self.inner.notify(severity, message).await
    }
}

#[async_trait]
impl<N: NotificationAdapter> NotificationAdapter for CooldownNotifier<N> {
    async fn notify(&self, severity: Severity, message: &str) -> Result<()> {
        self.notify_keyed(message, severity, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingNotifier(Arc<AtomicU32>);

    #[async_trait]
    impl NotificationAdapter for CountingNotifier {
        async fn notify(&self, _severity: Severity, _message: &str) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeats() {
        let count = Arc::new(AtomicU32::new(0));
        let notifier =
            CooldownNotifier::new(CountingNotifier(count.clone()), Duration::from_secs(60));

        for _ in 0..5 {
            notifier
                .notify_keyed("breaker.acct1", Severity::Warning, "halted")
                .await
                .unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_are_independent() {
        let count = Arc::new(AtomicU32::new(0));
        let notifier =
            CooldownNotifier::new(CountingNotifier(count.clone()), Duration::from_secs(60));

        notifier
            .notify_keyed("breaker.acct1", Severity::Warning, "halted")
            .await
            .unwrap();
        notifier
            .notify_keyed("breaker.acct2", Severity::Warning, "halted")
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn critical_bypasses_cooldown() {
        let count = Arc::new(AtomicU32::new(0));
        let notifier =
            CooldownNotifier::new(CountingNotifier(count.clone()), Duration::from_secs(60));

        for _ in 0..3 {
            notifier
                .notify_keyed("emergency", Severity::Critical, "stop")
                .await
                .unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
