//! Core traits and types for provider adapters
//!
//! This module defines the capability set every platform adapter implements
//! and the normalized shapes that cross the adapter boundary.

use crate::core::error::PublishError;
use crate::core::model::{Channel, Demographics, MediaKind, Metrics, Platform, Post};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Capabilities
// ============================================================================

/// Static capability metadata, queryable without a network call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCapabilities {
    pub max_content_length: usize,
    pub max_attachments: usize,
    pub media_kinds: Vec<MediaKind>,
    pub supports_delete: bool,
}

impl ProviderCapabilities {
    pub fn supports_media(&self, kind: MediaKind) -> bool {
        self.media_kinds.contains(&kind)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validation error with field information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Validation warning with field information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

/// Result of content validation against one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub platform: Platform,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

// ============================================================================
// Identifiers
// ============================================================================

/// How a platform builds compound identifiers out of a parent id
///
/// Facebook exposes page posts both as `POSTID` and `PAGEID_POSTID`,
/// LinkedIn as `123` and `urn:li:share:123`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdScheme {
    pub parent_id: String,
    pub separator: String,
}

impl IdScheme {
    pub fn new(parent_id: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            separator: separator.into(),
        }
    }

    pub fn prefix(&self) -> String {
        format!("{}{}", self.parent_id, self.separator)
    }

    /// Whether the id already carries some parent-separator pattern
    pub fn is_compound(&self, id: &str) -> bool {
        !self.separator.is_empty() && id.contains(self.separator.as_str())
    }

    /// `parent + separator + id` for ids lacking the separator pattern
    pub fn compound(&self, id: &str) -> Option<String> {
        if id.is_empty() || self.is_compound(id) {
            return None;
        }
        Some(format!("{}{}", self.prefix(), id))
    }

    /// The id with our parent prefix removed, if it carries that prefix
    pub fn strip(&self, id: &str) -> Option<String> {
        id.strip_prefix(self.prefix().as_str())
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    }
}

// ============================================================================
// Boundary types
// ============================================================================

/// Which fields to request on a point lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSet {
    /// Identifier only, cheapest existence probe
    Minimal,
    /// Identifier, text, permalink and creation time
    Standard,
}

/// Account behind a channel, as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_id: String,
    pub name: Option<String>,
}

/// Result of a publish call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub success: bool,
    pub canonical_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub post_type: String,
}

/// A platform object normalized out of the provider payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformObject {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl PlatformObject {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: None,
            url: None,
            created_at: None,
            extra: HashMap::new(),
        }
    }
}

/// Result of a delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub deleted: bool,
    /// The platform reported the object as already gone
    pub already_absent: bool,
}

/// Result of an existence probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistenceCheck {
    pub exists: bool,
    pub checked_at: DateTime<Utc>,
}

/// Normalized analytics returned by an adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderAnalytics {
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demographics: Option<Demographics>,
}

// ============================================================================
// Provider Adapter Trait
// ============================================================================

/// Main trait for platform adapter implementations
///
/// Every adapter absorbs its platform's wire format and error codes and
/// reports them through the classified [`PublishError`] kinds. Adapters know
/// nothing about scheduling or retries.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Platform served by this adapter
    fn platform(&self) -> Platform;

    /// Static limits used by the pre-publish validator
    fn capabilities(&self) -> ProviderCapabilities;

    /// Compound id scheme for the channel's account, if the platform has one
    fn id_scheme(&self, channel: &Channel) -> Option<IdScheme>;

    /// Check the channel credential against the platform
    async fn authenticate(&self, channel: &Channel) -> Result<AccountInfo, PublishError>;

    /// Publish the post on the channel's account
    async fn publish(&self, post: &Post, channel: &Channel)
    -> Result<PublishOutcome, PublishError>;

    /// Look an object up by id
    ///
    /// Must report `NotFound`, `Authentication`, `RateLimited` and
    /// `AmbiguousState` distinctly.
    async fn fetch_by_id(
        &self,
        id: &str,
        channel: &Channel,
        fields: FieldSet,
    ) -> Result<PlatformObject, PublishError>;

    /// Delete an object; an already-absent object counts as deleted
    async fn delete_by_id(&self, id: &str, channel: &Channel)
    -> Result<DeleteOutcome, PublishError>;

    /// Fetch platform metrics for a published object
    async fn get_analytics(
        &self,
        id: &str,
        channel: &Channel,
    ) -> Result<ProviderAnalytics, PublishError>;

    /// One page of the account's most recent objects, newest first
    async fn list_recent(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<PlatformObject>, PublishError>;

    /// Probe whether an object exists
    ///
    /// Default implementation runs a minimal lookup; ambiguous and
    /// credential errors are propagated, never coerced into a boolean.
    async fn check_exists(
        &self,
        id: &str,
        channel: &Channel,
    ) -> Result<ExistenceCheck, PublishError> {
        let exists = match self.fetch_by_id(id, channel, FieldSet::Minimal).await {
            Ok(_) => true,
            Err(PublishError::NotFound { .. }) => false,
            Err(e) => return Err(e),
        };

        Ok(ExistenceCheck {
            exists,
            checked_at: Utc::now(),
        })
    }
}
