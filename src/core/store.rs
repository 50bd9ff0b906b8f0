//! Durable store interfaces and the in-memory implementation
//!
//! The scheduler, collector and reconciler only see the traits below. The
//! storage engine behind them belongs to the host application;
//! [`MemoryStore`] is the bundled implementation used by the CLI and tests,
//! optionally snapshotted to a JSON file with atomic writes.

use crate::core::error::PublishError;
use crate::core::model::{
    AnalyticsRecord, Engagement, Platform, PlatformPost, Post, PostStatus, ReconciliationRecord,
    ScheduledTask,
};
use crate::core::state_machine::TaskStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Scheduled task persistence with atomic claim
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert_task(&self, task: ScheduledTask) -> Result<(), PublishError>;

    async fn get_task(&self, task_id: &str) -> Result<ScheduledTask, PublishError>;

    /// Pending tasks with `scheduled_at <= now`, oldest first
    async fn due_tasks(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledTask>, PublishError>;

    /// Compare-and-swap `pending → processing` for a task due at `now`
    ///
    /// Exactly one caller wins for a given due task; every other caller
    /// gets `TaskConflict`, as does a caller holding a stale due list for a
    /// task that was requeued into the future.
    async fn claim_task(
        &self,
        task_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ScheduledTask, PublishError>;

    /// Replace a task if its stored status still equals `expected`
    async fn update_task(
        &self,
        task: ScheduledTask,
        expected: TaskStatus,
    ) -> Result<(), PublishError>;

    async fn tasks_for_post(&self, post_id: &str) -> Result<Vec<ScheduledTask>, PublishError>;

    /// Move every pending task of a post to `cancelled`, returning their ids
    async fn cancel_pending_for_post(
        &self,
        post_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, PublishError>;

    async fn list_tasks(&self) -> Result<Vec<ScheduledTask>, PublishError>;
}

/// Post persistence
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert_post(&self, post: Post) -> Result<(), PublishError>;

    async fn get_post(&self, post_id: &str) -> Result<Post, PublishError>;

    /// Write-once record of a platform publish result
    async fn record_platform_post(
        &self,
        post_id: &str,
        platform: Platform,
        platform_post: PlatformPost,
    ) -> Result<(), PublishError>;

    async fn set_post_status(&self, post_id: &str, status: PostStatus)
    -> Result<(), PublishError>;

    /// Mark a post withdrawn; the post state is authoritative afterwards
    async fn withdraw_post(&self, post_id: &str) -> Result<Post, PublishError>;

    async fn set_engagement(&self, post_id: &str, engagement: Engagement)
    -> Result<(), PublishError>;

    async fn record_reconciliation(&self, record: ReconciliationRecord)
    -> Result<(), PublishError>;

    async fn reconciliations(
        &self,
        platform: Platform,
        input_id: &str,
    ) -> Result<Vec<ReconciliationRecord>, PublishError>;
}

/// Append-only analytics snapshots
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn append_analytics(&self, record: AnalyticsRecord) -> Result<(), PublishError>;

    /// Snapshots of one (post, platform), ordered by `collected_at`
    async fn analytics_for(
        &self,
        post_id: &str,
        platform: Platform,
    ) -> Result<Vec<AnalyticsRecord>, PublishError>;

    async fn all_analytics(&self) -> Result<Vec<AnalyticsRecord>, PublishError>;
}

/// Everything the orchestration layer needs from storage
pub trait PublishStore: TaskStore + PostStore + AnalyticsStore {}

impl<T: TaskStore + PostStore + AnalyticsStore> PublishStore for T {}

// ============================================================================
// In-memory implementation
// ============================================================================

/// Data file structure
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreSnapshot {
    version: String,
    tasks: BTreeMap<String, ScheduledTask>,
    posts: BTreeMap<String, Post>,
    analytics: Vec<AnalyticsRecord>,
    reconciliations: Vec<ReconciliationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_updated: Option<String>,
}

/// Mutex-guarded store; every mutation runs under one lock, which makes
/// the claim compare-and-swap atomic across workers
pub struct MemoryStore {
    state: Mutex<StoreSnapshot>,
    path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn store_error(message: impl Into<String>) -> PublishError {
    PublishError::Store {
        message: message.into(),
    }
}

impl MemoryStore {
    /// Create a store that lives only in memory
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreSnapshot {
                version: "1.0".to_string(),
                ..Default::default()
            }),
            path: None,
        }
    }

    /// Open a store snapshotted to `path`, loading it if it exists
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, PublishError> {
        let path = path.as_ref().to_path_buf();

        let snapshot = if fs::metadata(&path).await.is_ok() {
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| store_error(format!("failed to read {}: {}", path.display(), e)))?;
            serde_json::from_str(&content)
                .map_err(|e| store_error(format!("{} is corrupted: {}", path.display(), e)))?
        } else {
            StoreSnapshot {
                version: "1.0".to_string(),
                ..Default::default()
            }
        };

        Ok(Self {
            state: Mutex::new(snapshot),
            path: Some(path),
        })
    }

    /// Save snapshot to file (atomic operation)
    async fn persist(&self, snapshot: &mut StoreSnapshot) -> Result<(), PublishError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        snapshot.last_updated = Some(Utc::now().to_rfc3339());
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| store_error(format!("failed to serialize store: {}", e)))?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| store_error(format!("failed to create {}: {}", dir.display(), e)))?;
        }

        // Atomic write: write to temp file, then rename
        let temp_file = path.with_extension("json.tmp");
        fs::write(&temp_file, json)
            .await
            .map_err(|e| store_error(format!("failed to write {}: {}", temp_file.display(), e)))?;
        fs::rename(&temp_file, path)
            .await
            .map_err(|e| store_error(format!("failed to replace {}: {}", path.display(), e)))?;

        Ok(())
    }
}

fn missing_task(task_id: &str) -> PublishError {
    store_error(format!("task {} not found", task_id))
}

fn missing_post(post_id: &str) -> PublishError {
    store_error(format!("post {} not found", post_id))
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, task: ScheduledTask) -> Result<(), PublishError> {
        let mut state = self.state.lock().await;
        if state.tasks.contains_key(&task.id) {
            return Err(store_error(format!("task {} already exists", task.id)));
        }
        state.tasks.insert(task.id.clone(), task);
        self.persist(&mut state).await
    }

    async fn get_task(&self, task_id: &str) -> Result<ScheduledTask, PublishError> {
        let state = self.state.lock().await;
        state
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| missing_task(task_id))
    }

    async fn due_tasks(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledTask>, PublishError> {
        let state = self.state.lock().await;
        let mut due: Vec<_> = state
            .tasks
            .values()
            .filter(|t| t.is_due(now))
            .cloned()
            .collect();

        due.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_task(
        &self,
        task_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ScheduledTask, PublishError> {
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| missing_task(task_id))?;

        if !task.is_due(now) {
            return Err(PublishError::TaskConflict {
                task_id: task_id.to_string(),
                status: task.status.to_string(),
            });
        }

        task.transition(TaskStatus::Processing, now, Some(worker_id.to_string()))?;
        task.claimed_by = Some(worker_id.to_string());
        let claimed = task.clone();

        self.persist(&mut state).await?;
        Ok(claimed)
    }

    async fn update_task(
        &self,
        task: ScheduledTask,
        expected: TaskStatus,
    ) -> Result<(), PublishError> {
        let mut state = self.state.lock().await;
        let stored = state
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| missing_task(&task.id))?;

        if stored.status != expected {
            return Err(PublishError::TaskConflict {
                task_id: task.id.clone(),
                status: stored.status.to_string(),
            });
        }

        *stored = task;
        self.persist(&mut state).await
    }

    async fn tasks_for_post(&self, post_id: &str) -> Result<Vec<ScheduledTask>, PublishError> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .values()
            .filter(|t| t.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn cancel_pending_for_post(
        &self,
        post_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, PublishError> {
        let mut state = self.state.lock().await;
        let mut cancelled = Vec::new();

        for task in state.tasks.values_mut() {
            if task.post_id == post_id && task.status == TaskStatus::Pending {
                task.transition(TaskStatus::Cancelled, now, Some("post withdrawn".to_string()))?;
                cancelled.push(task.id.clone());
            }
        }

        self.persist(&mut state).await?;
        Ok(cancelled)
    }

    async fn list_tasks(&self) -> Result<Vec<ScheduledTask>, PublishError> {
        let state = self.state.lock().await;
        Ok(state.tasks.values().cloned().collect())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn insert_post(&self, post: Post) -> Result<(), PublishError> {
        let mut state = self.state.lock().await;
        if state.posts.contains_key(&post.id) {
            return Err(store_error(format!("post {} already exists", post.id)));
        }
        state.posts.insert(post.id.clone(), post);
        self.persist(&mut state).await
    }

    async fn get_post(&self, post_id: &str) -> Result<Post, PublishError> {
        let state = self.state.lock().await;
        state
            .posts
            .get(post_id)
            .cloned()
            .ok_or_else(|| missing_post(post_id))
    }

    async fn record_platform_post(
        &self,
        post_id: &str,
        platform: Platform,
        platform_post: PlatformPost,
    ) -> Result<(), PublishError> {
        let mut state = self.state.lock().await;
        state
            .posts
            .get_mut(post_id)
            .ok_or_else(|| missing_post(post_id))?
            .record_platform_post(platform, platform_post)?;
        self.persist(&mut state).await
    }

    async fn set_post_status(
        &self,
        post_id: &str,
        status: PostStatus,
    ) -> Result<(), PublishError> {
        let mut state = self.state.lock().await;
        state
            .posts
            .get_mut(post_id)
            .ok_or_else(|| missing_post(post_id))?
            .status = status;
        self.persist(&mut state).await
    }

    async fn withdraw_post(&self, post_id: &str) -> Result<Post, PublishError> {
        let mut state = self.state.lock().await;
        let post = state
            .posts
            .get_mut(post_id)
            .ok_or_else(|| missing_post(post_id))?;
        post.withdrawn = true;
        let withdrawn = post.clone();
        self.persist(&mut state).await?;
        Ok(withdrawn)
    }

    async fn set_engagement(
        &self,
        post_id: &str,
        engagement: Engagement,
    ) -> Result<(), PublishError> {
        let mut state = self.state.lock().await;
        state
            .posts
            .get_mut(post_id)
            .ok_or_else(|| missing_post(post_id))?
            .engagement = engagement;
        self.persist(&mut state).await
    }

    async fn record_reconciliation(
        &self,
        record: ReconciliationRecord,
    ) -> Result<(), PublishError> {
        let mut state = self.state.lock().await;
        state.reconciliations.push(record);
        self.persist(&mut state).await
    }

    async fn reconciliations(
        &self,
        platform: Platform,
        input_id: &str,
    ) -> Result<Vec<ReconciliationRecord>, PublishError> {
        let state = self.state.lock().await;
        Ok(state
            .reconciliations
            .iter()
            .filter(|r| r.platform == platform && r.input_id == input_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn append_analytics(&self, record: AnalyticsRecord) -> Result<(), PublishError> {
        let mut state = self.state.lock().await;
        state.analytics.push(record);
        self.persist(&mut state).await
    }

    async fn analytics_for(
        &self,
        post_id: &str,
        platform: Platform,
    ) -> Result<Vec<AnalyticsRecord>, PublishError> {
        let state = self.state.lock().await;
        let mut records: Vec<_> = state
            .analytics
            .iter()
            .filter(|r| r.post_id == post_id && r.platform == platform)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.collected_at.cmp(&b.collected_at));
        Ok(records)
    }

    async fn all_analytics(&self) -> Result<Vec<AnalyticsRecord>, PublishError> {
        let state = self.state.lock().await;
        Ok(state.analytics.clone())
    }
}
