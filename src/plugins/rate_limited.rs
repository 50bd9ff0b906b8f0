//! Rate-limited adapter wrapper
//!
//! Every network call of the wrapped adapter first takes a slot from the
//! per-(provider, channel) bucket, so publishing, resolution, reconciliation
//! and analytics all draw from the same quota.

use crate::core::error::PublishError;
use crate::core::model::{Channel, Platform, Post};
use crate::core::rate_limit::ChannelRateLimiter;
use crate::core::traits::{
    AccountInfo, DeleteOutcome, ExistenceCheck, FieldSet, IdScheme, PlatformObject,
    ProviderAdapter, ProviderAnalytics, ProviderCapabilities, PublishOutcome,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Adapter that waits for channel capacity before each remote call
pub struct RateLimitedAdapter {
    inner: Arc<dyn ProviderAdapter>,
    limiter: Arc<ChannelRateLimiter>,
}

impl RateLimitedAdapter {
    pub fn new(inner: Arc<dyn ProviderAdapter>, limiter: Arc<ChannelRateLimiter>) -> Self {
        Self { inner, limiter }
    }

    async fn acquire(&self, channel: &Channel) -> Result<(), PublishError> {
        self.limiter
            .acquire(self.inner.platform(), &channel.id)
            .await
    }
}

#[async_trait]
impl ProviderAdapter for RateLimitedAdapter {
    fn platform(&self) -> Platform {
        self.inner.platform()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.inner.capabilities()
    }

    fn id_scheme(&self, channel: &Channel) -> Option<IdScheme> {
        self.inner.id_scheme(channel)
    }

    async fn authenticate(&self, channel: &Channel) -> Result<AccountInfo, PublishError> {
        self.acquire(channel).await?;
        self.inner.authenticate(channel).await
    }

    async fn publish(&self, post: &Post, channel: &Channel) -> Result<PublishOutcome, PublishError> {
        self.acquire(channel).await?;
        self.inner.publish(post, channel).await
    }

    async fn fetch_by_id(
        &self,
        id: &str,
        channel: &Channel,
        fields: FieldSet,
    ) -> Result<PlatformObject, PublishError> {
        self.acquire(channel).await?;
        self.inner.fetch_by_id(id, channel, fields).await
    }

    async fn delete_by_id(&self, id: &str, channel: &Channel) -> Result<DeleteOutcome, PublishError> {
        self.acquire(channel).await?;
        self.inner.delete_by_id(id, channel).await
    }

    async fn get_analytics(
        &self,
        id: &str,
        channel: &Channel,
    ) -> Result<ProviderAnalytics, PublishError> {
        self.acquire(channel).await?;
        self.inner.get_analytics(id, channel).await
    }

    async fn list_recent(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<PlatformObject>, PublishError> {
        self.acquire(channel).await?;
        self.inner.list_recent(channel, limit).await
    }

    async fn check_exists(
        &self,
        id: &str,
        channel: &Channel,
    ) -> Result<ExistenceCheck, PublishError> {
        self.acquire(channel).await?;
        self.inner.check_exists(id, channel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate_limit::RateLimitSettings;
    use crate::plugins::sandbox_plugin::{SandboxOperation, SandboxPlugin};
    use std::collections::HashMap;
    use std::time::Duration;

    fn one_per_minute(max_queue_depth: usize) -> Arc<ChannelRateLimiter> {
        let mut settings = HashMap::new();
        settings.insert(
            Platform::Sandbox,
            RateLimitSettings {
                requests_per_minute: 1,
                burst: 1,
                max_queue_depth,
            },
        );
        Arc::new(ChannelRateLimiter::new(settings))
    }

    fn channel() -> Channel {
        Channel::new("sandbox-1", Platform::Sandbox, "SANDBOX", "sandbox-token-1234")
    }

    #[tokio::test]
    async fn test_reads_wait_for_channel_quota() {
        let sandbox = Arc::new(SandboxPlugin::with_scheme("SANDBOX", "_"));
        sandbox.insert_object("SANDBOX_1", "hello");
        let adapter = RateLimitedAdapter::new(sandbox.clone(), one_per_minute(4));

        adapter
            .fetch_by_id("SANDBOX_1", &channel(), FieldSet::Minimal)
            .await
            .unwrap();

        let second = tokio::time::timeout(
            Duration::from_millis(100),
            adapter.check_exists("SANDBOX_1", &channel()),
        )
        .await;
        assert!(second.is_err(), "second call should wait for quota");
        assert_eq!(sandbox.calls(SandboxOperation::Fetch), 1);
    }

    #[tokio::test]
    async fn test_full_waiter_queue_rejects_call() {
        let sandbox = Arc::new(SandboxPlugin::with_scheme("SANDBOX", "_"));
        let adapter = RateLimitedAdapter::new(sandbox.clone(), one_per_minute(0));

        let error = adapter.list_recent(&channel(), 25).await.unwrap_err();

        assert_eq!(error.code(), "RATE_LIMITED");
        assert_eq!(sandbox.calls(SandboxOperation::List), 0);
    }

    #[test]
    fn test_metadata_passes_through() {
        let sandbox = Arc::new(SandboxPlugin::with_scheme("SANDBOX", "_"));
        let adapter = RateLimitedAdapter::new(sandbox, ChannelRateLimiter::unlimited().into());

        assert_eq!(adapter.platform(), Platform::Sandbox);
        assert_eq!(adapter.capabilities().max_content_length, 5000);
        assert!(adapter.id_scheme(&channel()).is_some());
    }
}
