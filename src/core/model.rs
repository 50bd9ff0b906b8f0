//! Domain records shared by the scheduler, the adapters and the store
//!
//! Provider-specific payload shapes never appear here; adapters normalize
//! into these types before returning.

use crate::core::error::{ErrorKind, PublishError};
use crate::core::state_machine::{TaskStatus, TaskTransition, elapsed_ms, format_history};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

// ============================================================================
// Platforms
// ============================================================================

/// Supported social platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    LinkedIn,
    Sandbox,
}

impl Platform {
    /// Get string representation of the platform
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::LinkedIn => "linkedin",
            Platform::Sandbox => "sandbox",
        }
    }

    pub fn all() -> [Platform; 3] {
        [Platform::Facebook, Platform::LinkedIn, Platform::Sandbox]
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "facebook" | "fb" => Ok(Platform::Facebook),
            "linkedin" | "li" => Ok(Platform::LinkedIn),
            "sandbox" => Ok(Platform::Sandbox),
            other => Err(PublishError::Config {
                message: format!("unknown platform: {}", other),
            }),
        }
    }
}

// ============================================================================
// Scheduled tasks
// ============================================================================

/// Per-task scheduling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSettings {
    pub timezone: String,
    pub notify_on_failure: bool,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            notify_on_failure: true,
        }
    }
}

/// Classified error retained on a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl From<&PublishError> for TaskError {
    fn from(error: &PublishError) -> Self {
        Self {
            kind: error.kind(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.code, self.message)
    }
}

/// One publish intent for one (post, platform) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: String,
    pub post_id: String,
    pub platform: Platform,
    pub scheduled_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<TaskError>,
    pub settings: TaskSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub transitions: Vec<TaskTransition>,
}

impl ScheduledTask {
    pub fn new(
        post_id: impl Into<String>,
        platform: Platform,
        scheduled_at: DateTime<Utc>,
        max_retries: u32,
        settings: TaskSettings,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            post_id: post_id.into(),
            platform,
            scheduled_at,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries,
            last_error: None,
            settings,
            claimed_by: None,
            created_at: now,
            updated_at: now,
            transitions: Vec::new(),
        }
    }

    /// A task is due once its time has come and nobody has claimed it
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.scheduled_at <= now
    }

    /// Apply a validated status transition and record it in the history
    pub fn transition(
        &mut self,
        to: TaskStatus,
        now: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<(), PublishError> {
        if !self.status.can_transition_to(to) {
            return Err(PublishError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }

        self.transitions.push(TaskTransition {
            from: self.status,
            to,
            timestamp: now,
            note,
        });
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    pub fn history(&self) -> String {
        format_history(&self.transitions)
    }

    pub fn elapsed_ms(&self) -> i64 {
        elapsed_ms(&self.transitions)
    }
}

// ============================================================================
// Posts
// ============================================================================

/// Kind of media attached to a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Gif,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Gif => "gif",
            MediaKind::Document => "document",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAttachment {
    pub url: String,
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub media: Vec<MediaAttachment>,
}

/// Aggregate status of a post across its target platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Partial,
    Published,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Partial => "partial",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
            PostStatus::Cancelled => "cancelled",
        }
    }

    /// Derive the aggregate status from every platform task of a post
    ///
    /// The post only becomes `Published` when every platform published.
    /// Any mix of published and pending/failed platforms is `Partial`.
    pub fn aggregate(statuses: &[TaskStatus]) -> PostStatus {
        if statuses.is_empty() {
            return PostStatus::Draft;
        }

        let published = statuses
            .iter()
            .filter(|s| **s == TaskStatus::Published)
            .count();
        let failed = statuses.iter().filter(|s| **s == TaskStatus::Failed).count();
        let cancelled = statuses
            .iter()
            .filter(|s| **s == TaskStatus::Cancelled)
            .count();

        if published == statuses.len() {
            PostStatus::Published
        } else if published > 0 {
            PostStatus::Partial
        } else if cancelled == statuses.len() {
            PostStatus::Cancelled
        } else if failed > 0 && failed + cancelled == statuses.len() {
            PostStatus::Failed
        } else {
            PostStatus::Scheduled
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful publish on one platform, written once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformPost {
    pub canonical_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub post_type: String,
}

/// Aggregated engagement counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub impressions: u64,
    pub reach: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub clicks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub content: PostContent,
    pub platforms: BTreeSet<Platform>,
    #[serde(default)]
    pub platform_posts: BTreeMap<Platform, PlatformPost>,
    #[serde(default)]
    pub engagement: Engagement,
    pub status: PostStatus,
    #[serde(default)]
    pub withdrawn: bool,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn new(content: PostContent, platforms: impl IntoIterator<Item = Platform>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            platforms: platforms.into_iter().collect(),
            platform_posts: BTreeMap::new(),
            engagement: Engagement::default(),
            status: PostStatus::Draft,
            withdrawn: false,
            created_at: Utc::now(),
        }
    }

    /// Record the publish result for a platform
    ///
    /// The canonical id of a platform is immutable once set; writing the
    /// same record again is accepted, writing a different one is not.
    pub fn record_platform_post(
        &mut self,
        platform: Platform,
        platform_post: PlatformPost,
    ) -> Result<(), PublishError> {
        if let Some(existing) = self.platform_posts.get(&platform) {
            if existing.canonical_id == platform_post.canonical_id {
                return Ok(());
            }
            return Err(PublishError::Store {
                message: format!(
                    "post {} already has {} id {}, refusing to overwrite with {}",
                    self.id, platform, existing.canonical_id, platform_post.canonical_id
                ),
            });
        }

        self.platform_posts.insert(platform, platform_post);
        Ok(())
    }
}

// ============================================================================
// Channels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Expired,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTokens {
    pub access_token: SecretString,
    #[serde(default)]
    pub refresh_token: Option<SecretString>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Authenticated binding to one account on one provider
///
/// Read-only for the core: token issuance and refresh happen elsewhere.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub provider: Platform,
    /// Page id, organization id or equivalent parent account identifier
    pub account_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub oauth_tokens: OAuthTokens,
    pub connection_status: ConnectionStatus,
}

impl Channel {
    pub fn new(
        id: impl Into<String>,
        provider: Platform,
        account_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            provider,
            account_id: account_id.into(),
            display_name: None,
            oauth_tokens: OAuthTokens {
                access_token: SecretString::new(access_token.into().into_boxed_str()),
                refresh_token: None,
                expires_at: None,
            },
            connection_status: ConnectionStatus::Connected,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.oauth_tokens.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.connection_status == ConnectionStatus::Expired
            || self
                .oauth_tokens
                .expires_at
                .map(|expires_at| expires_at <= now)
                .unwrap_or(false)
    }

    /// Bearer credential, provided the channel is usable at `now`
    pub fn bearer(&self, now: DateTime<Utc>) -> Result<&str, PublishError> {
        if self.connection_status == ConnectionStatus::Disconnected {
            return Err(PublishError::ChannelUnavailable {
                platform: self.provider.to_string(),
                reason: format!("channel {} is disconnected", self.id),
            });
        }
        if self.is_expired(now) {
            return Err(PublishError::ChannelUnavailable {
                platform: self.provider.to_string(),
                reason: format!("access token of channel {} has expired", self.id),
            });
        }
        Ok(self.oauth_tokens.access_token.expose_secret())
    }
}

// ============================================================================
// Analytics
// ============================================================================

/// Normalized metrics; platforms lacking a metric report it as zero
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Metrics {
    pub impressions: u64,
    pub reach: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub clicks: u64,
    pub engagement_rate: f64,
}

impl Metrics {
    pub fn interactions(&self) -> u64 {
        self.likes + self.comments + self.shares + self.clicks
    }

    /// Fill `engagement_rate` from the counters when the platform did not
    pub fn with_derived_rate(mut self) -> Self {
        if self.engagement_rate == 0.0 && self.impressions > 0 {
            self.engagement_rate = self.interactions() as f64 / self.impressions as f64;
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demographics {
    #[serde(default)]
    pub by_country: BTreeMap<String, u64>,
    #[serde(default)]
    pub by_age_gender: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsSource {
    Live,
    Estimated,
}

/// One metrics snapshot per (post, platform, collection time)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRecord {
    pub id: String,
    pub post_id: String,
    pub platform: Platform,
    pub canonical_id: String,
    pub metrics: Metrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographics: Option<Demographics>,
    pub performance_score: f64,
    pub source: MetricsSource,
    pub collected_at: DateTime<Utc>,
}

// ============================================================================
// Resolution and reconciliation
// ============================================================================

/// Identifier resolution strategies, in the order they are attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Direct,
    CompoundPrefixed,
    Stripped,
    ListingFallback,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::Direct => "direct",
            ResolutionStrategy::CompoundPrefixed => "compound_prefixed",
            ResolutionStrategy::Stripped => "stripped",
            ResolutionStrategy::ListingFallback => "listing_fallback",
        }
    }
}

/// Whether a previously published object still exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Existence {
    Exists,
    Deleted,
    Unknown,
}

impl std::fmt::Display for Existence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Existence::Exists => "EXISTS",
            Existence::Deleted => "DELETED",
            Existence::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Stored outcome of one status check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationRecord {
    pub platform: Platform,
    pub input_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
    pub state: Existence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub checked_at: DateTime<Utc>,
}
