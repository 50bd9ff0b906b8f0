//! Publish Scheduler - Runs due publish tasks against the provider adapters
//!
//! Features:
//! - Atomic claim (`pending → processing`) before any adapter call
//! - Worker pool with concurrency control
//! - Bounded request timeouts, covering any wait for channel quota
//! - Retry with exponential backoff for transient failures
//! - Withdrawal handling for pending and in-flight tasks
//! - Notifications on terminal outcomes and analytics hand-off

use crate::core::config::SchedulerConfig;
use crate::core::error::PublishError;
use crate::core::model::{
    Platform, PlatformPost, Post, PostContent, PostStatus, ScheduledTask, TaskError, TaskSettings,
};
use crate::core::retry::BackoffPolicy;
use crate::core::state_machine::TaskStatus;
use crate::core::store::PublishStore;
use crate::core::traits::PublishOutcome;
use crate::notifications::{LogNotifier, Notification, NotificationSink};
use crate::orchestration::analytics::AnalyticsJob;
use crate::plugins::PluginLoader;
use crate::security::TokenStore;
use crate::validation::ContentValidator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, error, info, warn};

/// Scheduler options
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum concurrent publishes (default: 4)
    pub workers: usize,

    /// Due tasks fetched per pass (default: 50)
    pub batch_size: usize,

    /// Retry cap written into new tasks (default: 3)
    pub max_retries: u32,

    /// Requeue delay policy
    pub backoff: BackoffPolicy,

    /// Upper bound for one adapter call (default: 30s)
    pub request_timeout: Duration,

    /// Pause between passes of [`PublishScheduler::run`] (default: 30s)
    pub poll_interval: Duration,

    /// Identifier recorded on claimed tasks
    pub worker_id: String,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

impl SchedulerOptions {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            backoff: config.backoff_policy(),
            request_timeout: config.request_timeout(),
            poll_interval: config.poll_interval(),
            worker_id: format!("scheduler-{}", uuid::Uuid::new_v4()),
        }
    }
}

/// What happened to one claimed task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum TaskOutcome {
    Published {
        task_id: String,
        canonical_id: String,
    },
    Requeued {
        task_id: String,
        retry_count: u32,
        next_attempt: DateTime<Utc>,
    },
    Failed {
        task_id: String,
        error: TaskError,
    },
    Cancelled {
        task_id: String,
    },
    /// Claimed by another worker first
    Skipped {
        task_id: String,
    },
}

/// Result of one scheduler pass
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub due: usize,
    pub published: usize,
    pub requeued: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub outcomes: Vec<TaskOutcome>,
    /// Tasks whose processing errored outside the adapter call
    pub errors: BTreeMap<String, String>,
}

impl RunSummary {
    fn record(&mut self, outcome: TaskOutcome) {
        match &outcome {
            TaskOutcome::Published { .. } => self.published += 1,
            TaskOutcome::Requeued { .. } => self.requeued += 1,
            TaskOutcome::Failed { .. } => self.failed += 1,
            TaskOutcome::Cancelled { .. } => self.cancelled += 1,
            TaskOutcome::Skipped { .. } => self.skipped += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Print pass summary
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("📊 Scheduler Pass Summary");
        println!("{}", "=".repeat(60));
        println!("\n📥 Due: {}", self.due);
        println!("✅ Published: {}", self.published);
        println!("🔁 Requeued: {}", self.requeued);
        println!("❌ Failed: {}", self.failed);
        println!("🚫 Cancelled: {}", self.cancelled);
        if self.skipped > 0 {
            println!("⏭️  Skipped: {}", self.skipped);
        }

        for outcome in &self.outcomes {
            match outcome {
                TaskOutcome::Published {
                    task_id,
                    canonical_id,
                } => println!("   - {}: published as {}", task_id, canonical_id),
                TaskOutcome::Requeued {
                    task_id,
                    retry_count,
                    next_attempt,
                } => println!(
                    "   - {}: retry {} at {}",
                    task_id,
                    retry_count,
                    next_attempt.to_rfc3339()
                ),
                TaskOutcome::Failed { task_id, error } => {
                    println!("   - {}: {}", task_id, error)
                }
                TaskOutcome::Cancelled { task_id } => println!("   - {}: cancelled", task_id),
                TaskOutcome::Skipped { .. } => {}
            }
        }

        if !self.errors.is_empty() {
            println!("\n⚠️  Errors: {}", self.errors.len());
            for (task_id, error) in &self.errors {
                println!("   - {}: {}", task_id, error);
            }
        }
        println!("\n{}\n", "=".repeat(60));
    }
}

/// PublishScheduler - owns the lifecycle of scheduled publish tasks
///
/// Cheap to clone; clones share the store and adapters. Rate limiting is
/// applied by the adapters themselves (see [`PluginLoader::with_rate_limiter`]).
#[derive(Clone)]
pub struct PublishScheduler {
    store: Arc<dyn PublishStore>,
    loader: PluginLoader,
    tokens: Arc<dyn TokenStore>,
    notifier: Arc<dyn NotificationSink>,
    analytics: Option<mpsc::Sender<AnalyticsJob>>,
    validator: ContentValidator,
    options: SchedulerOptions,
}

impl PublishScheduler {
    pub fn new(
        store: Arc<dyn PublishStore>,
        loader: PluginLoader,
        tokens: Arc<dyn TokenStore>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            store,
            loader,
            tokens,
            notifier: Arc::new(LogNotifier),
            analytics: None,
            validator: ContentValidator::new(),
            options,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Queue an analytics job for every successful publish
    pub fn with_analytics(mut self, jobs: mpsc::Sender<AnalyticsJob>) -> Self {
        self.analytics = Some(jobs);
        self
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Create a pending task publishing a stored post to one platform
    ///
    /// The content is validated against the adapter's capabilities first.
    /// A post can have at most one live (pending, processing or published)
    /// task per platform.
    pub async fn schedule_publish(
        &self,
        post_id: &str,
        platform: Platform,
        when: DateTime<Utc>,
        settings: TaskSettings,
    ) -> Result<String, PublishError> {
        let post = self.store.get_post(post_id).await?;
        if post.withdrawn {
            return Err(PublishError::Validation {
                platform: platform.to_string(),
                message: format!("post {} has been withdrawn", post_id),
            });
        }
        if !post.platforms.contains(&platform) {
            return Err(PublishError::Validation {
                platform: platform.to_string(),
                message: format!("post {} does not target {}", post_id, platform),
            });
        }

        let adapter = self.loader.load_plugin(platform)?;
        self.validator
            .ensure_valid(platform, &post.content, &adapter.capabilities())?;

        if let Some(live) = self
            .store
            .tasks_for_post(post_id)
            .await?
            .into_iter()
            .find(|t| {
                t.platform == platform
                    && matches!(
                        t.status,
                        TaskStatus::Pending | TaskStatus::Processing | TaskStatus::Published
                    )
            })
        {
            return Err(PublishError::TaskConflict {
                task_id: live.id,
                status: live.status.to_string(),
            });
        }

        let task = ScheduledTask::new(post_id, platform, when, self.options.max_retries, settings);
        let task_id = task.id.clone();
        self.store.insert_task(task).await?;
        self.refresh_post_status(post_id).await?;

        info!(task_id = %task_id, post_id, %platform, scheduled_at = %when.to_rfc3339(), "publish scheduled");
        Ok(task_id)
    }

    /// Store a new post and schedule it on every platform
    ///
    /// Content is validated for all platforms before anything is stored.
    pub async fn schedule_post(
        &self,
        content: PostContent,
        platforms: &[Platform],
        when: DateTime<Utc>,
        settings: TaskSettings,
    ) -> Result<(Post, Vec<String>), PublishError> {
        if platforms.is_empty() {
            return Err(PublishError::Config {
                message: "at least one platform must be specified".to_string(),
            });
        }

        for platform in platforms {
            let adapter = self.loader.load_plugin(*platform)?;
            self.validator
                .ensure_valid(*platform, &content, &adapter.capabilities())?;
        }

        let post = Post::new(content, platforms.iter().copied());
        self.store.insert_post(post.clone()).await?;

        let mut task_ids = Vec::with_capacity(post.platforms.len());
        for platform in &post.platforms {
            task_ids.push(
                self.schedule_publish(&post.id, *platform, when, settings.clone())
                    .await?,
            );
        }

        let post = self.store.get_post(&post.id).await?;
        Ok((post, task_ids))
    }

    /// Withdraw a post: pending tasks are cancelled, in-flight ones have
    /// their result discarded
    pub async fn cancel_post(&self, post_id: &str) -> Result<Vec<String>, PublishError> {
        self.store.withdraw_post(post_id).await?;
        let cancelled = self
            .store
            .cancel_pending_for_post(post_id, Utc::now())
            .await?;
        self.refresh_post_status(post_id).await?;

        info!(post_id, cancelled = cancelled.len(), "post withdrawn");
        Ok(cancelled)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Run one pass over the tasks due now
    pub async fn run_due(&self) -> Result<RunSummary, PublishError> {
        self.run_due_at(Utc::now()).await
    }

    /// Run one pass over the tasks due at `now`
    ///
    /// Tasks run in parallel up to `workers`; each is claimed before its
    /// adapter call, so concurrent passes never publish a task twice.
    pub async fn run_due_at(&self, now: DateTime<Utc>) -> Result<RunSummary, PublishError> {
        let due = self.store.due_tasks(now, self.options.batch_size).await?;
        let mut summary = RunSummary {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return Ok(summary);
        }

        debug!(due = due.len(), workers = self.options.workers, "starting scheduler pass");

        let semaphore = Arc::new(Semaphore::new(self.options.workers));
        let mut handles = Vec::with_capacity(due.len());

        for task in due {
            let semaphore = Arc::clone(&semaphore);
            let scheduler = self.clone();
            let task_id = task.id.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| PublishError::Store {
                    message: format!("worker pool closed: {}", e),
                })?;
                scheduler.execute(&task.id, now).await
            });
            handles.push((task_id, handle));
        }

        for (task_id, handle) in handles {
            match handle.await {
                Ok(Ok(outcome)) => summary.record(outcome),
                Ok(Err(e)) => {
                    error!(task_id = %task_id, error = %e, "task processing failed");
                    summary.errors.insert(task_id, e.to_string());
                }
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "worker panicked");
                    summary.errors.insert(task_id, format!("Task failed: {}", e));
                }
            }
        }

        info!(
            due = summary.due,
            published = summary.published,
            requeued = summary.requeued,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "scheduler pass finished"
        );
        Ok(summary)
    }

    /// Poll for due tasks until `shutdown` turns true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), PublishError> {
        let mut interval = tokio::time::interval(self.options.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(worker_id = %self.options.worker_id, "scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_due().await {
                        error!(error = %e, "scheduler pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(worker_id = %self.options.worker_id, "scheduler stopped");
        Ok(())
    }

    /// Claim and process a single task
    ///
    /// The claim re-checks that the task is pending and due at `now`. A task
    /// claimed by another worker, or requeued past `now` since the caller
    /// listed it, comes back as [`TaskOutcome::Skipped`] without touching
    /// the adapter.
    pub async fn execute(&self, task_id: &str, now: DateTime<Utc>) -> Result<TaskOutcome, PublishError> {
        let task = match self
            .store
            .claim_task(task_id, &self.options.worker_id, now)
            .await
        {
            Ok(task) => task,
            Err(PublishError::TaskConflict { status, .. }) => {
                debug!(task_id, %status, "task claimed elsewhere or not due");
                return Ok(TaskOutcome::Skipped {
                    task_id: task_id.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let post = self.store.get_post(&task.post_id).await?;
        if post.withdrawn {
            return self.cancel_claimed(task, now, "post withdrawn before execution").await;
        }

        let result = self.attempt_publish(&task, &post).await;

        // The post state is authoritative; a withdrawal during the call wins
        let post = self.store.get_post(&task.post_id).await?;
        if post.withdrawn {
            if let Ok((outcome, _)) = &result {
                warn!(
                    task_id = %task.id,
                    canonical_id = %outcome.canonical_id,
                    "post withdrawn during publish, discarding result"
                );
            }
            return self.cancel_claimed(task, now, "post withdrawn during execution").await;
        }

        match result {
            Ok(outcome) => self.complete(task, outcome, now).await,
            Err(e) => self.fail(task, e, now).await,
        }
    }

    async fn attempt_publish(
        &self,
        task: &ScheduledTask,
        post: &Post,
    ) -> Result<(PublishOutcome, String), PublishError> {
        let platform = task.platform;
        let adapter = self.loader.load_plugin(platform)?;
        let channel = self.tokens.active_channel(platform)?;
        channel.bearer(Utc::now())?;

        debug!(task_id = %task.id, %platform, attempt = task.retry_count + 1, "publishing");
        let outcome = tokio::time::timeout(self.options.request_timeout, adapter.publish(post, &channel))
            .await
            .map_err(|_| PublishError::Timeout {
                platform: platform.to_string(),
                seconds: self.options.request_timeout.as_secs(),
            })??;

        if !outcome.success || outcome.canonical_id.is_empty() {
            return Err(PublishError::Rejected {
                platform: platform.to_string(),
                message: "platform did not confirm the publish".to_string(),
            });
        }

        Ok((outcome, channel.id))
    }

    async fn complete(
        &self,
        mut task: ScheduledTask,
        (outcome, channel_id): (PublishOutcome, String),
        now: DateTime<Utc>,
    ) -> Result<TaskOutcome, PublishError> {
        let platform_post = PlatformPost {
            canonical_id: outcome.canonical_id.clone(),
            url: outcome.url.clone(),
            published_at: Utc::now(),
            post_type: outcome.post_type.clone(),
        };
        self.store
            .record_platform_post(&task.post_id, task.platform, platform_post)
            .await?;

        task.transition(
            TaskStatus::Published,
            now,
            Some(format!("canonical id {}", outcome.canonical_id)),
        )?;
        task.last_error = None;
        self.store
            .update_task(task.clone(), TaskStatus::Processing)
            .await?;

        info!(
            task_id = %task.id,
            platform = %task.platform,
            canonical_id = %outcome.canonical_id,
            retries = task.retry_count,
            "task published"
        );

        if let Some(jobs) = &self.analytics {
            let job = AnalyticsJob {
                post_id: task.post_id.clone(),
                platform: task.platform,
                canonical_id: outcome.canonical_id.clone(),
                channel_id,
            };
            // Never block the worker on a full queue
            match jobs.try_send(job) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(job)) => {
                    debug!(task_id = %task.id, "analytics queue full, deferring job");
                    let jobs = jobs.clone();
                    let task_id = task.id.clone();
                    tokio::spawn(async move {
                        if jobs.send(job).await.is_err() {
                            warn!(task_id = %task_id, "analytics worker stopped, job not queued");
                        }
                    });
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(task_id = %task.id, "analytics worker stopped, job not queued");
                }
            }
        }

        self.notifier.notify(Notification::published(
            &task,
            outcome.canonical_id.clone(),
            outcome.url.clone(),
            now,
        ));
        self.refresh_post_status(&task.post_id).await?;

        Ok(TaskOutcome::Published {
            task_id: task.id,
            canonical_id: outcome.canonical_id,
        })
    }

    /// Classify an adapter failure: requeue with backoff or fail for good
    async fn fail(
        &self,
        mut task: ScheduledTask,
        error: PublishError,
        now: DateTime<Utc>,
    ) -> Result<TaskOutcome, PublishError> {
        let mut task_error = TaskError::from(&error);
        task_error.message = self.tokens.redact(&task_error.message);
        task.last_error = Some(task_error.clone());

        if error.is_retryable() && task.retry_count < task.max_retries {
            task.retry_count += 1;
            let delay = self
                .options
                .backoff
                .delay_for(task.retry_count, error.retry_after());
            let next_attempt = now
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));

            task.scheduled_at = next_attempt;
            task.claimed_by = None;
            task.transition(
                TaskStatus::Pending,
                now,
                Some(format!(
                    "retry {}/{}: {}",
                    task.retry_count,
                    task.max_retries,
                    error.code()
                )),
            )?;
            self.store
                .update_task(task.clone(), TaskStatus::Processing)
                .await?;

            warn!(
                task_id = %task.id,
                platform = %task.platform,
                attempt = task.retry_count,
                next_attempt = %next_attempt.to_rfc3339(),
                error = %task_error.message,
                "publish failed, requeued"
            );
            return Ok(TaskOutcome::Requeued {
                task_id: task.id,
                retry_count: task.retry_count,
                next_attempt,
            });
        }

        task.transition(TaskStatus::Failed, now, Some(error.code().to_string()))?;
        self.store
            .update_task(task.clone(), TaskStatus::Processing)
            .await?;

        error!(
            task_id = %task.id,
            platform = %task.platform,
            kind = %task_error.kind,
            retries = task.retry_count,
            error = %task_error.message,
            "publish failed"
        );

        if task.settings.notify_on_failure {
            self.notifier.notify(Notification::failed(&task, now));
        }
        self.refresh_post_status(&task.post_id).await?;

        Ok(TaskOutcome::Failed {
            task_id: task.id,
            error: task_error,
        })
    }

    async fn cancel_claimed(
        &self,
        mut task: ScheduledTask,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<TaskOutcome, PublishError> {
        task.transition(TaskStatus::Cancelled, now, Some(reason.to_string()))?;
        self.store
            .update_task(task.clone(), TaskStatus::Processing)
            .await?;
        self.refresh_post_status(&task.post_id).await?;

        info!(task_id = %task.id, reason, "task cancelled");
        Ok(TaskOutcome::Cancelled { task_id: task.id })
    }

    /// Recompute the post's aggregate status from its latest task per platform
    pub async fn refresh_post_status(&self, post_id: &str) -> Result<PostStatus, PublishError> {
        let tasks = self.store.tasks_for_post(post_id).await?;

        let mut latest: BTreeMap<Platform, &ScheduledTask> = BTreeMap::new();
        for task in &tasks {
            latest
                .entry(task.platform)
                .and_modify(|current| {
                    if task.created_at > current.created_at {
                        *current = task;
                    }
                })
                .or_insert(task);
        }

        let statuses: Vec<TaskStatus> = latest.values().map(|t| t.status).collect();
        let status = PostStatus::aggregate(&statuses);
        self.store.set_post_status(post_id, status).await?;
        Ok(status)
    }
}
