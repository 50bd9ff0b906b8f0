//! Configuration structures and types for social-publisher
//!
//! This module provides type-safe configuration management with serde support.
//! Top-level sections are optional so that layered files can override one
//! section without restating the others; fields inside a section fall back
//! to their defaults.

use crate::core::error::PublishError;
use crate::core::model::Platform;
use crate::core::rate_limit::RateLimitSettings;
use crate::core::retry::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Smallest and largest page requested by the listing fallback
pub const LISTING_PAGE_MIN: usize = 25;
pub const LISTING_PAGE_MAX: usize = 50;

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublisherConfig {
    /// Schema version (required)
    pub version: String,

    /// Extend from base configuration file (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<ProvidersConfig>,

    /// Per-platform quotas, keyed by platform name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<HashMap<String, RateLimitConfig>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<ResolverConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<AnalyticsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreConfig>,
}

/// Worker pool and retry settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Concurrent publish workers
    pub workers: usize,
    /// Seconds between polls for due tasks
    pub poll_interval_secs: u64,
    /// Maximum tasks claimed per poll
    pub batch_size: usize,
    /// Default `max_retries` for new tasks
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    /// Per-call timeout for adapter requests
    pub request_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_secs: 30,
            batch_size: 50,
            max_retries: 3,
            backoff_base_secs: 300,
            backoff_max_secs: 3600,
            request_timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_secs(self.backoff_base_secs),
            max_delay: Duration::from_secs(self.backoff_max_secs),
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Provider endpoint configurations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProvidersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<FacebookConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<LinkedInConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<SandboxConfig>,
}

/// Facebook Graph API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct FacebookConfig {
    pub enabled: bool,
    /// Graph API base URL (environment variable expansion supported)
    pub base_url: String,
    pub api_version: String,
    /// Page the channel publishes to; falls back to FACEBOOK_PAGE_ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://graph.facebook.com".to_string(),
            api_version: "v19.0".to_string(),
            page_id: None,
        }
    }
}

/// LinkedIn REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkedInConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Value of the `LinkedIn-Version` header (YYYYMM)
    pub api_version: String,
    /// Organization the channel posts as; falls back to LINKEDIN_ORGANIZATION_ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

impl Default for LinkedInConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.linkedin.com".to_string(),
            api_version: "202405".to_string(),
            organization_id: None,
        }
    }
}

/// In-memory provider used for dry runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SandboxConfig {
    pub enabled: bool,
    pub parent_id: String,
    pub separator: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            parent_id: "SANDBOX".to_string(),
            separator: "_".to_string(),
        }
    }
}

/// Quota for one platform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
    pub max_queue_depth: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let settings = RateLimitSettings::default();
        Self {
            requests_per_minute: settings.requests_per_minute,
            burst: settings.burst,
            max_queue_depth: settings.max_queue_depth,
        }
    }
}

impl From<RateLimitConfig> for RateLimitSettings {
    fn from(config: RateLimitConfig) -> Self {
        Self {
            requests_per_minute: config.requests_per_minute,
            burst: config.burst,
            max_queue_depth: config.max_queue_depth,
        }
    }
}

/// Identifier resolver settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverConfig {
    pub listing_page_size: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            listing_page_size: LISTING_PAGE_MIN,
        }
    }
}

impl ResolverConfig {
    /// Page size actually requested, clamped to the supported window
    pub fn page_size(&self) -> usize {
        self.listing_page_size
            .clamp(LISTING_PAGE_MIN, LISTING_PAGE_MAX)
    }
}

/// Analytics collector settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyticsConfig {
    pub like_weight: f64,
    pub comment_weight: f64,
    pub share_weight: f64,
    pub click_weight: f64,
    /// In-process attempts per metrics fetch
    pub fetch_attempts: u32,
    /// Queue a collection job when a task publishes
    pub collect_on_publish: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            like_weight: 1.0,
            comment_weight: 2.0,
            share_weight: 3.0,
            click_weight: 0.5,
            fetch_attempts: 3,
            collect_on_publish: true,
        }
    }
}

/// Notifications configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationsConfig {
    /// Enable webhook notifications (default: false)
    pub enabled: bool,

    /// Webhook URL (environment variable expansion supported)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// JSON snapshot file; memory only when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Default configuration values
impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            extends: None,
            scheduler: Some(SchedulerConfig::default()),
            providers: None,
            rate_limits: None,
            resolver: None,
            analytics: None,
            notifications: None,
            logging: Some(LoggingConfig::default()),
            store: None,
        }
    }
}

impl PublisherConfig {
    pub fn scheduler(&self) -> SchedulerConfig {
        self.scheduler.clone().unwrap_or_default()
    }

    pub fn providers(&self) -> ProvidersConfig {
        self.providers.clone().unwrap_or_default()
    }

    pub fn resolver(&self) -> ResolverConfig {
        self.resolver.clone().unwrap_or_default()
    }

    pub fn analytics(&self) -> AnalyticsConfig {
        self.analytics.clone().unwrap_or_default()
    }

    pub fn notifications(&self) -> NotificationsConfig {
        self.notifications.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    pub fn store(&self) -> StoreConfig {
        self.store.clone().unwrap_or_default()
    }

    /// Rate limit table keyed by platform
    pub fn rate_limit_settings(&self) -> Result<HashMap<Platform, RateLimitSettings>, PublishError> {
        let mut settings = HashMap::new();
        if let Some(limits) = &self.rate_limits {
            for (name, limit) in limits {
                let platform: Platform = name.parse()?;
                settings.insert(platform, RateLimitSettings::from(*limit));
            }
        }
        Ok(settings)
    }
}
