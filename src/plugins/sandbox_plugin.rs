//! Sandbox Plugin - in-memory platform for dry runs and tests
//!
//! Behaves like a real provider from the core's point of view: compound
//! identifiers, propagation delay between publish and direct lookup, access
//! restrictions that look like deletions, and scripted failures per operation.

use crate::core::config::SandboxConfig;
use crate::core::error::PublishError;
use crate::core::model::{Channel, Demographics, MediaKind, Metrics, Platform, Post};
use crate::core::traits::{
    AccountInfo, DeleteOutcome, FieldSet, IdScheme, PlatformObject, ProviderAdapter,
    ProviderAnalytics, ProviderCapabilities, PublishOutcome,
};
use crate::plugins::metrics::PlatformMetrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const PLATFORM: Platform = Platform::Sandbox;

/// Adapter operations that can be counted and scripted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxOperation {
    Authenticate,
    Publish,
    Fetch,
    Delete,
    Analytics,
    List,
}

#[derive(Debug, Clone)]
struct SandboxObject {
    id: String,
    text: String,
    created_at: DateTime<Utc>,
    /// Direct lookups fail with not-found until this instant
    visible_at: DateTime<Utc>,
    metrics: Metrics,
    demographics: Option<Demographics>,
    access_denied: bool,
}

#[derive(Default)]
struct SandboxState {
    objects: Vec<SandboxObject>,
    next_id: u64,
    failures: HashMap<SandboxOperation, VecDeque<PublishError>>,
    calls: HashMap<SandboxOperation, usize>,
    fetched_ids: Vec<String>,
}

/// In-memory provider
pub struct SandboxPlugin {
    scheme: IdScheme,
    propagation_delay: Duration,
    state: Mutex<SandboxState>,
}

impl Default for SandboxPlugin {
    fn default() -> Self {
        Self::new(&SandboxConfig::default())
    }
}

impl SandboxPlugin {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            scheme: IdScheme::new(config.parent_id.clone(), config.separator.clone()),
            propagation_delay: Duration::ZERO,
            state: Mutex::new(SandboxState {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Sandbox whose objects live under `parent_id + separator + n`
    pub fn with_scheme(parent_id: &str, separator: &str) -> Self {
        Self::new(&SandboxConfig {
            enabled: true,
            parent_id: parent_id.to_string(),
            separator: separator.to_string(),
        })
    }

    /// Delay between publish and the object becoming fetchable by id
    pub fn with_propagation_delay(mut self, delay: Duration) -> Self {
        self.propagation_delay = delay;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SandboxState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next call of `operation` with `error`; queued errors are
    /// consumed in order
    pub fn fail_next(&self, operation: SandboxOperation, error: PublishError) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Number of calls made to `operation` so far
    pub fn calls(&self, operation: SandboxOperation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Every id passed to `fetch_by_id`, in call order
    pub fn fetched_ids(&self) -> Vec<String> {
        self.lock().fetched_ids.clone()
    }

    /// Register an existing, immediately visible object
    pub fn insert_object(&self, id: &str, text: &str) {
        let now = Utc::now();
        self.lock().objects.push(SandboxObject {
            id: id.to_string(),
            text: text.to_string(),
            created_at: now,
            visible_at: now,
            metrics: Metrics::default(),
            demographics: None,
            access_denied: false,
        });
    }

    pub fn set_metrics(&self, id: &str, metrics: Metrics, demographics: Option<Demographics>) {
        let mut state = self.lock();
        if let Some(object) = state.objects.iter_mut().find(|o| o.id == id) {
            object.metrics = metrics;
            object.demographics = demographics;
        }
    }

    /// Make reads of `id` answer like a permission-revoked object
    pub fn deny_access(&self, id: &str) {
        let mut state = self.lock();
        if let Some(object) = state.objects.iter_mut().find(|o| o.id == id) {
            object.access_denied = true;
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().objects.iter().any(|o| o.id == id)
    }

    /// Count the call and pop a scripted failure, if any
    fn enter(&self, operation: SandboxOperation) -> Result<(), PublishError> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_insert(0) += 1;

        match state.failures.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn not_found(id: &str) -> PublishError {
        PublishError::NotFound {
            platform: PLATFORM.to_string(),
            id: id.to_string(),
            attempted: Vec::new(),
        }
    }

    fn access_denied(id: &str) -> PublishError {
        PublishError::AmbiguousState {
            platform: PLATFORM.to_string(),
            id: id.to_string(),
            message: "HTTP 403: object is not accessible".to_string(),
        }
    }

    fn to_object(object: &SandboxObject, fields: FieldSet) -> PlatformObject {
        let mut result = PlatformObject::with_id(object.id.clone());
        if fields == FieldSet::Standard {
            result.text = Some(object.text.clone());
            result.url = Some(format!("sandbox://posts/{}", object.id));
            result.created_at = Some(object.created_at);
        }
        result
    }
}

#[async_trait]
impl ProviderAdapter for SandboxPlugin {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            max_content_length: 5_000,
            max_attachments: 4,
            media_kinds: vec![MediaKind::Image, MediaKind::Video, MediaKind::Gif],
            supports_delete: true,
        }
    }

    fn id_scheme(&self, _channel: &Channel) -> Option<IdScheme> {
        Some(self.scheme.clone())
    }

    async fn authenticate(&self, channel: &Channel) -> Result<AccountInfo, PublishError> {
        self.enter(SandboxOperation::Authenticate)?;
        channel.bearer(Utc::now())?;

        Ok(AccountInfo {
            account_id: self.scheme.parent_id.clone(),
            name: channel.display_name.clone(),
        })
    }

    async fn publish(
        &self,
        post: &Post,
        channel: &Channel,
    ) -> Result<PublishOutcome, PublishError> {
        self.enter(SandboxOperation::Publish)?;
        channel.bearer(Utc::now())?;

        let now = Utc::now();
        let delay = chrono::Duration::from_std(self.propagation_delay).unwrap_or_default();

        let mut state = self.lock();
        let id = format!("{}{}", self.scheme.prefix(), state.next_id);
        state.next_id += 1;
        state.objects.push(SandboxObject {
            id: id.clone(),
            text: post.content.text.clone(),
            created_at: now,
            visible_at: now + delay,
            metrics: Metrics::default(),
            demographics: None,
            access_denied: false,
        });

        let post_type = if post.content.media.is_empty() {
            "status"
        } else {
            "media"
        };

        Ok(PublishOutcome {
            success: true,
            url: Some(format!("sandbox://posts/{}", id)),
            canonical_id: id,
            post_type: post_type.to_string(),
        })
    }

    async fn fetch_by_id(
        &self,
        id: &str,
        channel: &Channel,
        fields: FieldSet,
    ) -> Result<PlatformObject, PublishError> {
        self.enter(SandboxOperation::Fetch)?;
        channel.bearer(Utc::now())?;

        let mut state = self.lock();
        state.fetched_ids.push(id.to_string());

        let now = Utc::now();
        match state.objects.iter().find(|o| o.id == id) {
            Some(object) if object.access_denied => Err(Self::access_denied(id)),
            Some(object) if object.visible_at <= now => Ok(Self::to_object(object, fields)),
            _ => Err(Self::not_found(id)),
        }
    }

    async fn delete_by_id(
        &self,
        id: &str,
        channel: &Channel,
    ) -> Result<DeleteOutcome, PublishError> {
        self.enter(SandboxOperation::Delete)?;
        channel.bearer(Utc::now())?;

        let mut state = self.lock();
        let before = state.objects.len();
        state.objects.retain(|o| o.id != id);
        let already_absent = state.objects.len() == before;

        Ok(DeleteOutcome {
            deleted: true,
            already_absent,
        })
    }

    async fn get_analytics(
        &self,
        id: &str,
        channel: &Channel,
    ) -> Result<ProviderAnalytics, PublishError> {
        self.enter(SandboxOperation::Analytics)?;
        channel.bearer(Utc::now())?;

        let state = self.lock();
        let object = state
            .objects
            .iter()
            .find(|o| o.id == id)
            .ok_or_else(|| Self::not_found(id))?;
        if object.access_denied {
            return Err(Self::access_denied(id));
        }

        Ok(ProviderAnalytics {
            metrics: PlatformMetrics::Sandbox(object.metrics.clone()).normalize(),
            demographics: object.demographics.clone(),
        })
    }

    async fn list_recent(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<PlatformObject>, PublishError> {
        self.enter(SandboxOperation::List)?;
        channel.bearer(Utc::now())?;

        let state = self.lock();
        Ok(state
            .objects
            .iter()
            .rev()
            .filter(|o| !o.access_denied)
            .take(limit)
            .map(|o| Self::to_object(o, FieldSet::Standard))
            .collect())
    }
}
