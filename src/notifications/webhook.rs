//! Webhook notification sink
//!
//! Posts each [`Notification`] as a JSON body to a configured URL.
//! Delivery runs on a spawned tokio task so the scheduler never waits
//! on the receiver.

use super::{Notification, NotificationSink};
use crate::core::error::PublishError;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, warn};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends notifications via HTTP POST
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: Url,
    client: Client,
}

impl WebhookNotifier {
    /// Create a notifier for an http(s) URL
    pub fn new(url: &str) -> Result<Self, PublishError> {
        let url = Url::parse(url).map_err(|e| PublishError::Config {
            message: format!("invalid webhook URL {}: {}", url, e),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PublishError::Config {
                message: format!("webhook URL must start with http:// or https://: {}", url),
            });
        }

        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| PublishError::Config {
                message: format!("failed to build webhook client: {}", e),
            })?;

        Ok(Self { url, client })
    }

    /// Deliver one notification and wait for the response
    pub async fn deliver(&self, notification: &Notification) -> Result<(), PublishError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(notification)
            .send()
            .await
            .map_err(|e| PublishError::TransientNetwork {
                platform: "webhook".to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected {
                platform: "webhook".to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        debug!(task_id = %notification.task_id, "webhook notification delivered");
        Ok(())
    }
}

impl NotificationSink for WebhookNotifier {
    fn notify(&self, notification: Notification) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(task_id = %notification.task_id, "no async runtime, webhook notification dropped");
            return;
        };

        let notifier = self.clone();
        handle.spawn(async move {
            if let Err(e) = notifier.deliver(&notification).await {
                warn!(task_id = %notification.task_id, error = %e, "webhook notification failed");
            }
        });
    }
}
