//! Social Publisher - Entry point for scheduling and managing posts
//!
//! Wires the scheduler, identifier resolver, status reconciler and
//! analytics collector to one store, one adapter registry and one
//! credential supply.

use crate::core::config::PublisherConfig;
use crate::core::error::PublishError;
use crate::core::model::{
    AnalyticsRecord, Platform, Post, PostContent, PostStatus, ReconciliationRecord, ScheduledTask,
    TaskError, TaskSettings,
};
use crate::core::rate_limit::ChannelRateLimiter;
use crate::core::state_machine::TaskStatus;
use crate::core::store::PublishStore;
use crate::core::traits::{AccountInfo, DeleteOutcome, PlatformObject};
use crate::notifications::NotificationSink;
use crate::orchestration::analytics::{AnalyticsCollector, job_queue};
use crate::orchestration::identifier_resolver::{IdentifierResolver, Resolution};
use crate::orchestration::reconciler::StatusReconciler;
use crate::orchestration::scheduler::{PublishScheduler, RunSummary, SchedulerOptions};
use crate::plugins::PluginLoader;
use crate::security::TokenStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const ANALYTICS_QUEUE_CAPACITY: usize = 256;

/// Per-platform line of a [`PostReport`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformReport {
    pub platform: Platform,
    pub task_id: String,
    pub task_status: TaskStatus,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<TaskError>,
}

/// Per-platform outcome of one post
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReport {
    pub post_id: String,
    pub status: PostStatus,
    pub withdrawn: bool,
    pub platforms: Vec<PlatformReport>,
}

impl PostReport {
    /// Platforms whose latest task failed
    pub fn failed_platforms(&self) -> Vec<Platform> {
        self.platforms
            .iter()
            .filter(|p| p.task_status == TaskStatus::Failed)
            .map(|p| p.platform)
            .collect()
    }

    /// Turn a mixed outcome into [`PublishError::PartialPlatformFailure`]
    ///
    /// Per-platform results stay available in the store; failed platforms
    /// can be rescheduled with [`SocialPublisher::schedule_publish`].
    pub fn into_result(self) -> Result<PostReport, PublishError> {
        if self.status == PostStatus::Partial {
            let failed = self.failed_platforms();
            if !failed.is_empty() {
                return Err(PublishError::PartialPlatformFailure {
                    post_id: self.post_id,
                    failed: failed.iter().map(|p| p.to_string()).collect(),
                });
            }
        }
        Ok(self)
    }

    /// Print report
    pub fn print(&self) {
        println!("\n📮 Post {} ({})", self.post_id, self.status);
        if self.withdrawn {
            println!("   withdrawn");
        }
        for line in &self.platforms {
            let marker = match line.task_status {
                TaskStatus::Published => "✅",
                TaskStatus::Failed => "❌",
                TaskStatus::Cancelled => "🚫",
                TaskStatus::Pending | TaskStatus::Processing => "⏳",
            };
            print!("   {} {}: {}", marker, line.platform, line.task_status);
            if let Some(id) = &line.canonical_id {
                print!(" as {}", id);
            }
            if line.retry_count > 0 {
                print!(" after {} retries", line.retry_count);
            }
            println!();
            if let Some(error) = &line.last_error {
                println!("      {}", error);
            }
        }
        println!();
    }
}

pub struct SocialPublisher {
    store: Arc<dyn PublishStore>,
    loader: PluginLoader,
    tokens: Arc<dyn TokenStore>,
    scheduler: PublishScheduler,
    resolver: IdentifierResolver,
    reconciler: StatusReconciler,
    analytics: Arc<AnalyticsCollector>,
    analytics_worker: Option<JoinHandle<()>>,
}

impl SocialPublisher {
    /// Create a publisher from configuration
    ///
    /// Must be called inside a tokio runtime when `analytics.collectOnPublish`
    /// is set, since the collection worker is spawned here.
    pub fn new(
        config: &PublisherConfig,
        store: Arc<dyn PublishStore>,
        loader: PluginLoader,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self, PublishError> {
        let collector = AnalyticsCollector::new(
            store.clone(),
            loader.clone(),
            tokens.clone(),
            &config.analytics(),
        );
        Self::with_collector(config, store, loader, tokens, notifier, collector)
    }

    /// Create a publisher around a preconfigured analytics collector
    pub fn with_collector(
        config: &PublisherConfig,
        store: Arc<dyn PublishStore>,
        loader: PluginLoader,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn NotificationSink>,
        collector: AnalyticsCollector,
    ) -> Result<Self, PublishError> {
        if loader.is_empty() {
            return Err(PublishError::Config {
                message: "no provider adapters are enabled".to_string(),
            });
        }

        // One bucket per channel, shared by every component that calls out
        let limiter = Arc::new(ChannelRateLimiter::new(config.rate_limit_settings()?));
        let loader = loader.with_rate_limiter(limiter);

        let mut scheduler = PublishScheduler::new(
            store.clone(),
            loader.clone(),
            tokens.clone(),
            SchedulerOptions::from_config(&config.scheduler()),
        )
        .with_notifier(notifier);

        let analytics = Arc::new(collector.with_loader(loader.clone()));
        let mut analytics_worker = None;
        if config.analytics().collect_on_publish {
            tokio::runtime::Handle::try_current().map_err(|e| PublishError::Config {
                message: format!("analytics collection requires a tokio runtime: {}", e),
            })?;
            let (jobs, queue) = job_queue(ANALYTICS_QUEUE_CAPACITY);
            analytics_worker = Some(analytics.clone().spawn_worker(queue));
            scheduler = scheduler.with_analytics(jobs);
        }

        let resolver = IdentifierResolver::new(&config.resolver());
        let reconciler = StatusReconciler::new(resolver.clone(), store.clone());

        info!(platforms = ?loader.platforms(), "social publisher ready");

        Ok(Self {
            store,
            loader,
            tokens,
            scheduler,
            resolver,
            reconciler,
            analytics,
            analytics_worker,
        })
    }

    pub fn scheduler(&self) -> &PublishScheduler {
        &self.scheduler
    }

    pub fn analytics(&self) -> &AnalyticsCollector {
        &self.analytics
    }

    pub fn store(&self) -> &Arc<dyn PublishStore> {
        &self.store
    }

    /// Platforms with a registered adapter
    pub fn platforms(&self) -> Vec<Platform> {
        self.loader.platforms()
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    pub async fn schedule_publish(
        &self,
        post_id: &str,
        platform: Platform,
        when: DateTime<Utc>,
        settings: TaskSettings,
    ) -> Result<String, PublishError> {
        self.scheduler
            .schedule_publish(post_id, platform, when, settings)
            .await
    }

    pub async fn schedule_post(
        &self,
        content: PostContent,
        platforms: &[Platform],
        when: DateTime<Utc>,
        settings: TaskSettings,
    ) -> Result<(Post, Vec<String>), PublishError> {
        self.scheduler
            .schedule_post(content, platforms, when, settings)
            .await
    }

    pub async fn cancel_post(&self, post_id: &str) -> Result<Vec<String>, PublishError> {
        self.scheduler.cancel_post(post_id).await
    }

    pub async fn run_due(&self) -> Result<RunSummary, PublishError> {
        self.scheduler.run_due().await
    }

    pub async fn run_due_at(&self, now: DateTime<Utc>) -> Result<RunSummary, PublishError> {
        self.scheduler.run_due_at(now).await
    }

    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), PublishError> {
        self.scheduler.run(shutdown).await
    }

    /// Per-platform outcome built from the latest task of each platform
    pub async fn post_report(&self, post_id: &str) -> Result<PostReport, PublishError> {
        let post = self.store.get_post(post_id).await?;
        let tasks = self.store.tasks_for_post(post_id).await?;

        let mut latest: BTreeMap<Platform, ScheduledTask> = BTreeMap::new();
        for task in tasks {
            let newer = latest
                .get(&task.platform)
                .is_none_or(|current| task.created_at > current.created_at);
            if newer {
                latest.insert(task.platform, task);
            }
        }

        let platforms = latest
            .into_values()
            .map(|task| {
                let platform_post = post.platform_posts.get(&task.platform);
                PlatformReport {
                    platform: task.platform,
                    task_id: task.id,
                    task_status: task.status,
                    retry_count: task.retry_count,
                    canonical_id: platform_post.map(|p| p.canonical_id.clone()),
                    url: platform_post.and_then(|p| p.url.clone()),
                    last_error: task.last_error,
                }
            })
            .collect();

        Ok(PostReport {
            post_id: post.id,
            status: post.status,
            withdrawn: post.withdrawn,
            platforms,
        })
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Resolve a user-supplied id to the platform's canonical id
    pub async fn resolve_id(&self, platform: Platform, input: &str) -> Result<Resolution, PublishError> {
        let adapter = self.loader.load_plugin(platform)?;
        let channel = self.tokens.active_channel(platform)?;
        self.resolver.resolve(adapter.as_ref(), input, &channel).await
    }

    /// Reconcile whether a published object still exists
    pub async fn get_post_status(
        &self,
        platform: Platform,
        id: &str,
    ) -> Result<ReconciliationRecord, PublishError> {
        let adapter = self.loader.load_plugin(platform)?;
        let channel = self.tokens.active_channel(platform)?;
        self.reconciler.check(adapter.as_ref(), id, &channel).await
    }

    /// Fetch the platform's view of a published object
    pub async fn view_post(&self, platform: Platform, input: &str) -> Result<PlatformObject, PublishError> {
        Ok(self.resolve_id(platform, input).await?.object)
    }

    /// Delete a published object
    ///
    /// An id that no longer resolves counts as already deleted.
    pub async fn delete_post(&self, platform: Platform, input: &str) -> Result<DeleteOutcome, PublishError> {
        let adapter = self.loader.load_plugin(platform)?;
        if !adapter.capabilities().supports_delete {
            return Err(PublishError::UnsupportedOperation {
                platform: platform.to_string(),
                operation: "delete".to_string(),
            });
        }
        let channel = self.tokens.active_channel(platform)?;

        let resolution = match self.resolver.resolve(adapter.as_ref(), input, &channel).await {
            Ok(resolution) => resolution,
            Err(PublishError::NotFound { .. }) => {
                info!(%platform, input, "object already absent");
                return Ok(DeleteOutcome {
                    deleted: true,
                    already_absent: true,
                });
            }
            Err(e) => return Err(e),
        };

        let outcome = adapter.delete_by_id(&resolution.canonical_id, &channel).await?;
        info!(
            %platform,
            canonical_id = %resolution.canonical_id,
            already_absent = outcome.already_absent,
            "object deleted"
        );
        Ok(outcome)
    }

    /// Check that the platform accepts the active channel's credentials
    pub async fn verify_channel(&self, platform: Platform) -> Result<AccountInfo, PublishError> {
        let adapter = self.loader.load_plugin(platform)?;
        let channel = self.tokens.active_channel(platform)?;
        channel.bearer(Utc::now())?;

        let account = adapter.authenticate(&channel).await?;
        if account.account_id != channel.account_id {
            warn!(
                %platform,
                channel = %channel.id,
                account = %account.account_id,
                "credentials belong to a different account than configured"
            );
        }
        Ok(account)
    }

    /// Collect an analytics snapshot now
    pub async fn collect_analytics(
        &self,
        post_id: &str,
        platform: Platform,
    ) -> Result<AnalyticsRecord, PublishError> {
        self.analytics.collect(post_id, platform).await
    }

    /// Stop the analytics worker after it drains queued jobs
    pub async fn shutdown(self) {
        let Self {
            scheduler,
            analytics_worker,
            ..
        } = self;
        drop(scheduler);

        if let Some(worker) = analytics_worker
            && let Err(e) = worker.await
        {
            warn!(error = %e, "analytics worker ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{ProvidersConfig, SandboxConfig};
    use crate::core::model::{Channel, Existence};
    use crate::core::store::{AnalyticsStore, MemoryStore};
    use crate::notifications::LogNotifier;
    use crate::plugins::sandbox_plugin::{SandboxOperation, SandboxPlugin};
    use crate::security::SecureTokenStore;

    fn config(collect_on_publish: bool) -> PublisherConfig {
        let mut config = PublisherConfig::default();
        config.providers = Some(ProvidersConfig {
            sandbox: Some(SandboxConfig {
                enabled: true,
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut analytics = config.analytics();
        analytics.collect_on_publish = collect_on_publish;
        config.analytics = Some(analytics);
        config
    }

    fn publisher(sandbox: Arc<SandboxPlugin>) -> (SocialPublisher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mut loader = PluginLoader::new();
        loader.register(sandbox);
        let tokens = Arc::new(SecureTokenStore::new());
        tokens.insert(Channel::new("sandbox-1", Platform::Sandbox, "PAGE42", "sandbox-token-1234"));

        let publisher = SocialPublisher::new(
            &config(false),
            store.clone(),
            loader,
            tokens,
            Arc::new(LogNotifier),
        )
        .unwrap();
        (publisher, store)
    }

    fn content(text: &str) -> PostContent {
        PostContent {
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_requires_an_adapter() {
        let result = SocialPublisher::new(
            &config(false),
            Arc::new(MemoryStore::new()),
            PluginLoader::new(),
            Arc::new(SecureTokenStore::new()),
            Arc::new(LogNotifier),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_publish_then_report() {
        let sandbox = Arc::new(SandboxPlugin::with_scheme("PAGE42", "_"));
        let (publisher, _) = publisher(sandbox);

        let (post, _) = publisher
            .schedule_post(content("hello"), &[Platform::Sandbox], Utc::now(), TaskSettings::default())
            .await
            .unwrap();
        publisher.run_due().await.unwrap();

        let report = publisher.post_report(&post.id).await.unwrap().into_result().unwrap();
        assert_eq!(report.status, PostStatus::Published);
        assert_eq!(report.platforms.len(), 1);
        assert_eq!(report.platforms[0].canonical_id.as_deref(), Some("PAGE42_1"));
    }

    #[tokio::test]
    async fn test_resolve_and_view() {
        let sandbox = Arc::new(SandboxPlugin::with_scheme("PAGE42", "_"));
        sandbox.insert_object("PAGE42_55", "existing post");
        let (publisher, _) = publisher(sandbox);

        let resolution = publisher.resolve_id(Platform::Sandbox, "55").await.unwrap();
        assert_eq!(resolution.canonical_id, "PAGE42_55");

        let object = publisher.view_post(Platform::Sandbox, "PAGE42_55").await.unwrap();
        assert_eq!(object.text.as_deref(), Some("existing post"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let sandbox = Arc::new(SandboxPlugin::with_scheme("PAGE42", "_"));
        sandbox.insert_object("PAGE42_8", "to delete");
        let (publisher, _) = publisher(sandbox.clone());

        let first = publisher.delete_post(Platform::Sandbox, "PAGE42_8").await.unwrap();
        let second = publisher.delete_post(Platform::Sandbox, "PAGE42_8").await.unwrap();

        assert!(first.deleted);
        assert!(!first.already_absent);
        assert!(second.deleted);
        assert!(second.already_absent);
        assert!(!sandbox.contains("PAGE42_8"));
    }

    #[tokio::test]
    async fn test_status_of_deleted_object() {
        let sandbox = Arc::new(SandboxPlugin::with_scheme("PAGE42", "_"));
        let (publisher, _) = publisher(sandbox);

        let record = publisher
            .get_post_status(Platform::Sandbox, "PAGE42_404")
            .await
            .unwrap();
        assert_eq!(record.state, Existence::Deleted);
    }

    #[tokio::test]
    async fn test_verify_channel() {
        let sandbox = Arc::new(SandboxPlugin::with_scheme("PAGE42", "_"));
        let (publisher, _) = publisher(sandbox.clone());

        publisher.verify_channel(Platform::Sandbox).await.unwrap();
        assert_eq!(sandbox.calls(SandboxOperation::Authenticate), 1);

        let error = publisher.verify_channel(Platform::Facebook).await.unwrap_err();
        assert_eq!(error.code(), "UNSUPPORTED_OPERATION");
    }

    #[tokio::test]
    async fn test_analytics_collected_on_publish() {
        let store = Arc::new(MemoryStore::new());
        let sandbox = Arc::new(SandboxPlugin::with_scheme("PAGE42", "_"));
        let mut loader = PluginLoader::new();
        loader.register(sandbox);
        let tokens = Arc::new(SecureTokenStore::new());
        tokens.insert(Channel::new("sandbox-1", Platform::Sandbox, "PAGE42", "sandbox-token-1234"));

        let publisher = SocialPublisher::new(
            &config(true),
            store.clone(),
            loader,
            tokens,
            Arc::new(LogNotifier),
        )
        .unwrap();

        let (post, _) = publisher
            .schedule_post(content("hello"), &[Platform::Sandbox], Utc::now(), TaskSettings::default())
            .await
            .unwrap();
        publisher.run_due().await.unwrap();
        publisher.shutdown().await;

        let records = store.analytics_for(&post.id, Platform::Sandbox).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].canonical_id, "PAGE42_1");
    }
}
