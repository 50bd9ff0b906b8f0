//! Notification sinks for terminal publish outcomes
//!
//! The scheduler calls [`NotificationSink::notify`] once per task when it
//! reaches `published` or `failed`. Sinks are fire-and-forget: delivery
//! problems are logged, never returned to the scheduler.

pub mod webhook;

pub use webhook::WebhookNotifier;

use crate::core::config::NotificationsConfig;
use crate::core::error::PublishError;
use crate::core::model::{Platform, ScheduledTask, TaskError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Terminal outcome being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Published,
    Failed,
}

/// Payload handed to every sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub task_id: String,
    pub post_id: String,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub retry_count: u32,
    pub occurred_at: DateTime<Utc>,
}

impl Notification {
    pub fn published(
        task: &ScheduledTask,
        canonical_id: impl Into<String>,
        url: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: NotificationKind::Published,
            task_id: task.id.clone(),
            post_id: task.post_id.clone(),
            platform: task.platform,
            canonical_id: Some(canonical_id.into()),
            url,
            error: None,
            retry_count: task.retry_count,
            occurred_at: now,
        }
    }

    /// Failure notice carrying the task's last classified error
    pub fn failed(task: &ScheduledTask, now: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::Failed,
            task_id: task.id.clone(),
            post_id: task.post_id.clone(),
            platform: task.platform,
            canonical_id: None,
            url: None,
            error: task.last_error.clone(),
            retry_count: task.retry_count,
            occurred_at: now,
        }
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        match self.kind {
            NotificationKind::Published => format!(
                "✅ Post {} published to {} as {}",
                self.post_id,
                self.platform,
                self.canonical_id.as_deref().unwrap_or("?")
            ),
            NotificationKind::Failed => format!(
                "❌ Post {} failed on {} after {} retries: {}",
                self.post_id,
                self.platform,
                self.retry_count,
                self.error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        }
    }
}

/// Receiver of terminal publish outcomes
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Published => info!(
                task_id = %notification.task_id,
                platform = %notification.platform,
                "{}",
                notification.summary()
            ),
            NotificationKind::Failed => error!(
                task_id = %notification.task_id,
                platform = %notification.platform,
                "{}",
                notification.summary()
            ),
        }
    }
}

/// Build the sink described by the configuration
///
/// A webhook is used when notifications are enabled and a URL is set,
/// the log otherwise.
pub fn sink_from_config(
    config: &NotificationsConfig,
) -> Result<Arc<dyn NotificationSink>, PublishError> {
    match (&config.webhook_url, config.enabled) {
        (Some(url), true) => Ok(Arc::new(WebhookNotifier::new(url)?)),
        _ => Ok(Arc::new(LogNotifier)),
    }
}
