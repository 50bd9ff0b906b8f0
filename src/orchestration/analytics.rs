//! Analytics Collector - Collect and analyze post engagement metrics
//!
//! Features:
//! - Best-effort metrics fetch after every successful publish
//! - Fallback to the last known snapshot when the platform errors
//! - Deterministic performance score
//! - Filter and query snapshots, per-post timelines
//! - Statistics per platform and Markdown/JSON reports

use crate::core::config::AnalyticsConfig;
use crate::core::error::PublishError;
use crate::core::model::{
    AnalyticsRecord, Channel, Engagement, Metrics, MetricsSource, Platform,
};
use crate::core::retry::{RetryManager, RetryOptions};
use crate::core::store::PublishStore;
use crate::plugins::PluginLoader;
use crate::security::TokenStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Collection request queued by the scheduler after a publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsJob {
    pub post_id: String,
    pub platform: Platform,
    pub canonical_id: String,
    pub channel_id: String,
}

/// Weights of the performance score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub like: f64,
    pub comment: f64,
    pub share: f64,
    pub click: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::from(&AnalyticsConfig::default())
    }
}

impl From<&AnalyticsConfig> for ScoreWeights {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            like: config.like_weight,
            comment: config.comment_weight,
            share: config.share_weight,
            click: config.click_weight,
        }
    }
}

/// Performance score in `0..=100`
///
/// Weighted interactions per impression, scaled to a percentage, capped at
/// 100 and rounded to two decimals. Non-decreasing in every interaction
/// counter for non-negative weights.
pub fn performance_score(metrics: &Metrics, weights: &ScoreWeights) -> f64 {
    let weighted = metrics.likes as f64 * weights.like
        + metrics.comments as f64 * weights.comment
        + metrics.shares as f64 * weights.share
        + metrics.clicks as f64 * weights.click;
    let impressions = metrics.impressions.max(1) as f64;

    let score = (100.0 * weighted / impressions).clamp(0.0, 100.0);
    (score * 100.0).round() / 100.0
}

/// Options for filtering analytics records
#[derive(Debug, Clone, Default)]
pub struct AnalyticsQuery {
    pub post_id: Option<String>,
    pub platform: Option<Platform>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub min_score: Option<f64>,
    pub live_only: bool,
    pub limit: Option<usize>,
}

/// Platform-specific statistics, computed over the latest snapshot of
/// every post
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStatistics {
    pub platform: Platform,
    pub posts: usize,
    pub snapshots: usize,
    pub total_impressions: u64,
    pub total_interactions: u64,
    pub average_score: f64,
    pub average_engagement_rate: f64,
    pub best_post_id: Option<String>,
    pub last_collected: DateTime<Utc>,
}

/// Overall engagement statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsStatistics {
    pub total_snapshots: usize,
    pub estimated_snapshots: usize,
    pub posts: usize,
    pub average_score: f64,
    pub totals: Engagement,
    pub by_platform: BTreeMap<Platform, PlatformStatistics>,
    pub time_range: Option<TimeRange>,
}

/// Time range for statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Comprehensive analytics report
#[derive(Debug, Clone)]
pub struct AnalyticsReport {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub statistics: AnalyticsStatistics,
    pub recent: Vec<AnalyticsRecord>,
    pub markdown_summary: String,
    pub json_data: String,
}

/// AnalyticsCollector - Fetch, normalize and score platform metrics
pub struct AnalyticsCollector {
    store: Arc<dyn PublishStore>,
    loader: PluginLoader,
    tokens: Arc<dyn TokenStore>,
    weights: ScoreWeights,
    retry: RetryOptions,
}

impl AnalyticsCollector {
    pub fn new(
        store: Arc<dyn PublishStore>,
        loader: PluginLoader,
        tokens: Arc<dyn TokenStore>,
        config: &AnalyticsConfig,
    ) -> Self {
        Self {
            store,
            loader,
            tokens,
            weights: ScoreWeights::from(config),
            retry: RetryOptions {
                max_attempts: config.fetch_attempts.max(1),
                ..RetryOptions::default()
            },
        }
    }

    /// Override the in-process retry timing of metrics fetches
    /// Replace the adapter registry, e.g. with a rate-limited one
    pub fn with_loader(mut self, loader: PluginLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_retry_options(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Collect a snapshot on demand for a published post
    pub async fn collect(
        &self,
        post_id: &str,
        platform: Platform,
    ) -> Result<AnalyticsRecord, PublishError> {
        let post = self.store.get_post(post_id).await?;
        let platform_post = post.platform_posts.get(&platform).ok_or_else(|| {
            PublishError::NotFound {
                platform: platform.to_string(),
                id: post_id.to_string(),
                attempted: Vec::new(),
            }
        })?;
        let channel = self.tokens.active_channel(platform)?;

        self.collect_for(post_id, platform, &platform_post.canonical_id, &channel)
            .await
    }

    /// Collect the snapshot requested by a queued job
    pub async fn collect_job(&self, job: &AnalyticsJob) -> Result<AnalyticsRecord, PublishError> {
        let channel = match self.tokens.channel(&job.channel_id) {
            Some(channel) => channel,
            None => self.tokens.active_channel(job.platform)?,
        };

        self.collect_for(&job.post_id, job.platform, &job.canonical_id, &channel)
            .await
    }

    /// Fetch, normalize, score and append one snapshot
    ///
    /// A platform error never fails the collection: the last stored
    /// snapshot is carried forward as an estimate, or zeros if there is none.
    pub async fn collect_for(
        &self,
        post_id: &str,
        platform: Platform,
        canonical_id: &str,
        channel: &Channel,
    ) -> Result<AnalyticsRecord, PublishError> {
        let adapter = self.loader.load_plugin(platform)?;
        let manager = RetryManager::new(self.retry.clone());

        let fetched = manager
            .retry(|| adapter.get_analytics(canonical_id, channel))
            .await;

        let (metrics, demographics, source) = match fetched {
            Ok(analytics) => (
                analytics.metrics.with_derived_rate(),
                analytics.demographics,
                MetricsSource::Live,
            ),
            Err(e) => {
                warn!(
                    post_id,
                    %platform,
                    error = %e,
                    "metrics fetch failed, using last known snapshot"
                );
                let previous = self.store.analytics_for(post_id, platform).await?;
                match previous.last() {
                    Some(last) => (
                        last.metrics.clone(),
                        last.demographics.clone(),
                        MetricsSource::Estimated,
                    ),
                    None => (Metrics::default(), None, MetricsSource::Estimated),
                }
            }
        };

        let record = AnalyticsRecord {
            id: self.generate_id(),
            post_id: post_id.to_string(),
            platform,
            canonical_id: canonical_id.to_string(),
            performance_score: performance_score(&metrics, &self.weights),
            metrics,
            demographics,
            source,
            collected_at: Utc::now(),
        };

        self.store.append_analytics(record.clone()).await?;
        self.refresh_engagement(post_id).await?;

        info!(
            post_id,
            %platform,
            score = record.performance_score,
            source = ?record.source,
            "analytics collected"
        );
        Ok(record)
    }

    /// Consume jobs until every sender is dropped
    pub fn spawn_worker(self: Arc<Self>, mut jobs: mpsc::Receiver<AnalyticsJob>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                debug!(post_id = %job.post_id, platform = %job.platform, "analytics job received");
                if let Err(e) = self.collect_job(&job).await {
                    warn!(post_id = %job.post_id, platform = %job.platform, error = %e, "analytics job failed");
                }
            }
            debug!("analytics worker stopped");
        })
    }

    /// Get filtered records, most recent first
    pub async fn records(&self, query: &AnalyticsQuery) -> Result<Vec<AnalyticsRecord>, PublishError> {
        let mut filtered: Vec<_> = self
            .store
            .all_analytics()
            .await?
            .into_iter()
            .filter(|r| {
                if let Some(ref post_id) = query.post_id
                    && &r.post_id != post_id
                {
                    return false;
                }

                if let Some(platform) = query.platform
                    && r.platform != platform
                {
                    return false;
                }

                if let Some(start_date) = query.start_date
                    && r.collected_at < start_date
                {
                    return false;
                }

                if let Some(end_date) = query.end_date
                    && r.collected_at > end_date
                {
                    return false;
                }

                if let Some(min_score) = query.min_score
                    && r.performance_score < min_score
                {
                    return false;
                }

                !(query.live_only && r.source != MetricsSource::Live)
            })
            .collect();

        filtered.sort_by(|a, b| b.collected_at.cmp(&a.collected_at));

        if let Some(limit) = query.limit {
            filtered.truncate(limit);
        }

        Ok(filtered)
    }

    /// Snapshots of one post on one platform, oldest first
    pub async fn timeline(
        &self,
        post_id: &str,
        platform: Platform,
    ) -> Result<Vec<AnalyticsRecord>, PublishError> {
        self.store.analytics_for(post_id, platform).await
    }

    /// Calculate statistics from records
    pub async fn statistics(&self, query: &AnalyticsQuery) -> Result<AnalyticsStatistics, PublishError> {
        let records = self.records(&AnalyticsQuery {
            limit: None,
            ..query.clone()
        })
        .await?;
        Ok(calculate_statistics(&records))
    }

    /// Generate a comprehensive report
    pub async fn generate_report(&self, query: &AnalyticsQuery) -> Result<AnalyticsReport, PublishError> {
        let statistics = self.statistics(query).await?;

        let mut recent_query = query.clone();
        if recent_query.limit.is_none() {
            recent_query.limit = Some(10);
        }
        let recent = self.records(&recent_query).await?;

        let markdown_summary = generate_markdown_summary(&statistics, &recent);
        let json_data = generate_json_export(&statistics, &recent)?;

        Ok(AnalyticsReport {
            title: generate_report_title(query),
            generated_at: Utc::now(),
            statistics,
            recent,
            markdown_summary,
            json_data,
        })
    }

    // Private methods

    fn generate_id(&self) -> String {
        format!("{}-{}", Utc::now().timestamp_millis(), uuid::Uuid::new_v4())
    }

    /// Post engagement is the sum of the latest snapshot per platform
    async fn refresh_engagement(&self, post_id: &str) -> Result<(), PublishError> {
        let post = self.store.get_post(post_id).await?;
        let mut engagement = Engagement::default();

        for platform in &post.platforms {
            let snapshots = self.store.analytics_for(post_id, *platform).await?;
            if let Some(latest) = snapshots.last() {
                add_metrics(&mut engagement, &latest.metrics);
            }
        }

        self.store.set_engagement(post_id, engagement).await
    }
}

/// Queue handle for collection jobs
pub fn job_queue(capacity: usize) -> (mpsc::Sender<AnalyticsJob>, mpsc::Receiver<AnalyticsJob>) {
    mpsc::channel(capacity.max(1))
}

fn add_metrics(engagement: &mut Engagement, metrics: &Metrics) {
    engagement.impressions += metrics.impressions;
    engagement.reach += metrics.reach;
    engagement.likes += metrics.likes;
    engagement.comments += metrics.comments;
    engagement.shares += metrics.shares;
    engagement.clicks += metrics.clicks;
}

/// Latest snapshot per (post, platform); `records` may be in any order
fn latest_snapshots(records: &[AnalyticsRecord]) -> Vec<&AnalyticsRecord> {
    let mut latest: BTreeMap<(&str, Platform), &AnalyticsRecord> = BTreeMap::new();
    for record in records {
        latest
            .entry((record.post_id.as_str(), record.platform))
            .and_modify(|current| {
                if record.collected_at > current.collected_at {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    latest.into_values().collect()
}

fn calculate_statistics(records: &[AnalyticsRecord]) -> AnalyticsStatistics {
    let latest = latest_snapshots(records);

    let mut totals = Engagement::default();
    for record in &latest {
        add_metrics(&mut totals, &record.metrics);
    }

    let average_score = if latest.is_empty() {
        0.0
    } else {
        latest.iter().map(|r| r.performance_score).sum::<f64>() / latest.len() as f64
    };

    let mut grouped: BTreeMap<Platform, Vec<&AnalyticsRecord>> = BTreeMap::new();
    for record in latest.iter().copied() {
        grouped.entry(record.platform).or_default().push(record);
    }

    let by_platform = grouped
        .into_iter()
        .filter_map(|(platform, platform_records)| {
            let last_collected = platform_records.iter().map(|r| r.collected_at).max()?;
            let best = platform_records
                .iter()
                .max_by(|a, b| a.performance_score.total_cmp(&b.performance_score))?;
            let count = platform_records.len() as f64;

            let stats = PlatformStatistics {
                platform,
                posts: platform_records.len(),
                snapshots: records.iter().filter(|r| r.platform == platform).count(),
                total_impressions: platform_records.iter().map(|r| r.metrics.impressions).sum(),
                total_interactions: platform_records
                    .iter()
                    .map(|r| r.metrics.interactions())
                    .sum(),
                average_score: platform_records
                    .iter()
                    .map(|r| r.performance_score)
                    .sum::<f64>()
                    / count,
                average_engagement_rate: platform_records
                    .iter()
                    .map(|r| r.metrics.engagement_rate)
                    .sum::<f64>()
                    / count,
                best_post_id: Some(best.post_id.clone()),
                last_collected,
            };
            Some((platform, stats))
        })
        .collect();

    let time_range = match (
        records.iter().map(|r| r.collected_at).min(),
        records.iter().map(|r| r.collected_at).max(),
    ) {
        (Some(start), Some(end)) => Some(TimeRange { start, end }),
        _ => None,
    };

    let posts = latest
        .iter()
        .map(|r| r.post_id.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .len();

    AnalyticsStatistics {
        total_snapshots: records.len(),
        estimated_snapshots: records
            .iter()
            .filter(|r| r.source == MetricsSource::Estimated)
            .count(),
        posts,
        average_score,
        totals,
        by_platform,
        time_range,
    }
}

fn generate_report_title(query: &AnalyticsQuery) -> String {
    let mut parts = vec!["Engagement Analytics Report".to_string()];

    if let Some(platform) = query.platform {
        parts.push(format!("- {}", platform));
    }

    if let Some(ref post_id) = query.post_id {
        parts.push(format!("- {}", post_id));
    }

    parts.join(" ")
}

fn generate_markdown_summary(statistics: &AnalyticsStatistics, recent: &[AnalyticsRecord]) -> String {
    let mut lines = Vec::new();

    lines.push("# Engagement Analytics Report\n".to_string());
    lines.push(format!("**Generated**: {}\n", Utc::now().to_rfc3339()));

    // Overall Statistics
    lines.push("## Overall Statistics\n".to_string());
    lines.push(format!("- **Posts**: {}", statistics.posts));
    lines.push(format!("- **Snapshots**: {}", statistics.total_snapshots));
    lines.push(format!("- **Estimated Snapshots**: {}", statistics.estimated_snapshots));
    lines.push(format!("- **Impressions**: {}", statistics.totals.impressions));
    lines.push(format!(
        "- **Interactions**: {}",
        statistics.totals.likes
            + statistics.totals.comments
            + statistics.totals.shares
            + statistics.totals.clicks
    ));
    lines.push(format!("- **Average Score**: {:.2}\n", statistics.average_score));

    // Time Range
    if let Some(ref range) = statistics.time_range {
        lines.push("### Time Range\n".to_string());
        lines.push(format!("- **Start**: {}", range.start.to_rfc3339()));
        lines.push(format!("- **End**: {}\n", range.end.to_rfc3339()));
    }

    // Platform Statistics
    if !statistics.by_platform.is_empty() {
        lines.push("## Platform Statistics\n".to_string());
        lines.push("| Platform | Posts | Impressions | Interactions | Avg Score | Avg Engagement |".to_string());
        lines.push("|----------|-------|-------------|--------------|-----------|----------------|".to_string());

        for stats in statistics.by_platform.values() {
            lines.push(format!(
                "| {} | {} | {} | {} | {:.2} | {:.2}% |",
                stats.platform,
                stats.posts,
                stats.total_impressions,
                stats.total_interactions,
                stats.average_score,
                stats.average_engagement_rate * 100.0
            ));
        }
        lines.push(String::new());
    }

    // Recent Snapshots
    if !recent.is_empty() {
        lines.push("## Recent Snapshots\n".to_string());
        lines.push("| Collected | Platform | Post | Impressions | Score | Source |".to_string());
        lines.push("|-----------|----------|------|-------------|-------|--------|".to_string());

        for record in recent {
            let source = match record.source {
                MetricsSource::Live => "📡 Live",
                MetricsSource::Estimated => "📎 Estimated",
            };
            lines.push(format!(
                "| {} | {} | {} | {} | {:.2} | {} |",
                record.collected_at.format("%Y-%m-%d %H:%M"),
                record.platform,
                record.canonical_id,
                record.metrics.impressions,
                record.performance_score,
                source
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn generate_json_export(
    statistics: &AnalyticsStatistics,
    recent: &[AnalyticsRecord],
) -> Result<String, PublishError> {
    let data = serde_json::json!({
        "generatedAt": Utc::now().to_rfc3339(),
        "statistics": statistics,
        "recentSnapshots": recent,
    });

    serde_json::to_string_pretty(&data).map_err(|e| PublishError::Store {
        message: format!("failed to serialize analytics report: {}", e),
    })
}

/// Retry timing used when the collector runs inside tests or dry runs
pub fn immediate_retry(attempts: u32) -> RetryOptions {
    RetryOptions {
        max_attempts: attempts.max(1),
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_multiplier: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Post, PostContent, PlatformPost};
    use crate::core::store::{AnalyticsStore, MemoryStore, PostStore};
    use crate::plugins::sandbox_plugin::{SandboxOperation, SandboxPlugin};
    use crate::security::SecureTokenStore;

    struct Fixture {
        collector: AnalyticsCollector,
        store: Arc<MemoryStore>,
        sandbox: Arc<SandboxPlugin>,
        post_id: String,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let sandbox = Arc::new(SandboxPlugin::with_scheme("PAGE42", "_"));
        sandbox.insert_object("PAGE42_1", "hello");

        let mut loader = PluginLoader::new();
        loader.register(sandbox.clone());

        let tokens = Arc::new(SecureTokenStore::new());
        tokens.insert(Channel::new("sandbox-1", Platform::Sandbox, "PAGE42", "sandbox-token"));

        let post = Post::new(
            PostContent {
                text: "hello".to_string(),
                ..Default::default()
            },
            [Platform::Sandbox],
        );
        let post_id = post.id.clone();
        store.insert_post(post).await.unwrap();
        store
            .record_platform_post(
                &post_id,
                Platform::Sandbox,
                PlatformPost {
                    canonical_id: "PAGE42_1".to_string(),
                    url: None,
                    published_at: Utc::now(),
                    post_type: "status".to_string(),
                },
            )
            .await
            .unwrap();

        let collector = AnalyticsCollector::new(
            store.clone(),
            loader,
            tokens,
            &AnalyticsConfig::default(),
        )
        .with_retry_options(immediate_retry(2));

        Fixture {
            collector,
            store,
            sandbox,
            post_id,
        }
    }

    fn metrics(impressions: u64, likes: u64, comments: u64, shares: u64, clicks: u64) -> Metrics {
        Metrics {
            impressions,
            reach: impressions / 2,
            likes,
            comments,
            shares,
            clicks,
            engagement_rate: 0.0,
        }
    }

    #[test]
    fn test_performance_score() {
        let weights = ScoreWeights::default();

        // (10*1 + 5*2 + 2*3 + 4*0.5) / 200 * 100 = 14
        assert_eq!(performance_score(&metrics(200, 10, 5, 2, 4), &weights), 14.0);
        assert_eq!(performance_score(&Metrics::default(), &weights), 0.0);
        assert_eq!(performance_score(&metrics(1, 50, 50, 50, 50), &weights), 100.0);
    }

    #[test]
    fn test_performance_score_is_monotonic() {
        let weights = ScoreWeights::default();
        let base = performance_score(&metrics(1000, 10, 10, 10, 10), &weights);

        assert!(performance_score(&metrics(1000, 11, 10, 10, 10), &weights) >= base);
        assert!(performance_score(&metrics(1000, 10, 11, 10, 10), &weights) >= base);
        assert!(performance_score(&metrics(1000, 10, 10, 11, 10), &weights) >= base);
        assert!(performance_score(&metrics(1000, 10, 10, 10, 11), &weights) >= base);
        assert!(performance_score(&metrics(2000, 10, 10, 10, 10), &weights) <= base);
    }

    #[tokio::test]
    async fn test_collect_live_metrics() {
        let f = fixture().await;
        f.sandbox
            .set_metrics("PAGE42_1", metrics(200, 10, 5, 2, 4), None);

        let record = f.collector.collect(&f.post_id, Platform::Sandbox).await.unwrap();

        assert_eq!(record.source, MetricsSource::Live);
        assert_eq!(record.canonical_id, "PAGE42_1");
        assert_eq!(record.performance_score, 14.0);
        assert!((record.metrics.engagement_rate - 0.105).abs() < 1e-9);

        let post = f.store.get_post(&f.post_id).await.unwrap();
        assert_eq!(post.engagement.impressions, 200);
        assert_eq!(post.engagement.likes, 10);
    }

    #[tokio::test]
    async fn test_provider_error_falls_back_to_last_snapshot() {
        let f = fixture().await;
        f.sandbox
            .set_metrics("PAGE42_1", metrics(200, 10, 5, 2, 4), None);
        f.collector.collect(&f.post_id, Platform::Sandbox).await.unwrap();

        for _ in 0..2 {
            f.sandbox.fail_next(
                SandboxOperation::Analytics,
                PublishError::TransientNetwork {
                    platform: "sandbox".to_string(),
                    message: "connection reset".to_string(),
                },
            );
        }
        let record = f.collector.collect(&f.post_id, Platform::Sandbox).await.unwrap();

        assert_eq!(record.source, MetricsSource::Estimated);
        assert_eq!(record.metrics.impressions, 200);
        assert_eq!(f.sandbox.calls(SandboxOperation::Analytics), 3);

        let timeline = f.collector.timeline(&f.post_id, Platform::Sandbox).await.unwrap();
        assert_eq!(timeline.len(), 2);
        assert!(timeline[0].collected_at <= timeline[1].collected_at);
    }

    #[tokio::test]
    async fn test_first_collection_without_data_is_zero_estimate() {
        let f = fixture().await;
        f.sandbox.fail_next(
            SandboxOperation::Analytics,
            PublishError::Authentication {
                platform: "sandbox".to_string(),
                message: "insights permission missing".to_string(),
            },
        );

        let record = f.collector.collect(&f.post_id, Platform::Sandbox).await.unwrap();

        assert_eq!(record.source, MetricsSource::Estimated);
        assert_eq!(record.metrics, Metrics::default());
        assert_eq!(record.performance_score, 0.0);
        // Non-retryable, so only one attempt
        assert_eq!(f.sandbox.calls(SandboxOperation::Analytics), 1);
    }

    #[tokio::test]
    async fn test_collect_requires_published_platform() {
        let f = fixture().await;
        let error = f
            .collector
            .collect(&f.post_id, Platform::Facebook)
            .await
            .unwrap_err();
        assert_eq!(error.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_worker_consumes_jobs() {
        let f = fixture().await;
        let store = f.store.clone();
        let post_id = f.post_id.clone();
        let collector = Arc::new(f.collector);

        let (tx, rx) = job_queue(4);
        let worker = collector.clone().spawn_worker(rx);
        tx.send(AnalyticsJob {
            post_id: post_id.clone(),
            platform: Platform::Sandbox,
            canonical_id: "PAGE42_1".to_string(),
            channel_id: "sandbox-1".to_string(),
        })
        .await
        .unwrap();
        drop(tx);
        worker.await.unwrap();

        let records = store.analytics_for(&post_id, Platform::Sandbox).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_records_statistics_and_report() {
        let f = fixture().await;
        f.sandbox
            .set_metrics("PAGE42_1", metrics(100, 4, 1, 0, 0), None);
        f.collector.collect(&f.post_id, Platform::Sandbox).await.unwrap();
        f.sandbox
            .set_metrics("PAGE42_1", metrics(200, 10, 5, 2, 4), None);
        f.collector.collect(&f.post_id, Platform::Sandbox).await.unwrap();

        let records = f.collector.records(&AnalyticsQuery::default()).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].collected_at >= records[1].collected_at);

        let limited = f
            .collector
            .records(&AnalyticsQuery {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let statistics = f.collector.statistics(&AnalyticsQuery::default()).await.unwrap();
        assert_eq!(statistics.total_snapshots, 2);
        assert_eq!(statistics.posts, 1);
        // Only the latest snapshot counts towards totals
        assert_eq!(statistics.totals.impressions, 200);
        let sandbox_stats = &statistics.by_platform[&Platform::Sandbox];
        assert_eq!(sandbox_stats.snapshots, 2);
        assert_eq!(sandbox_stats.best_post_id.as_deref(), Some(f.post_id.as_str()));

        let report = f
            .collector
            .generate_report(&AnalyticsQuery {
                platform: Some(Platform::Sandbox),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(report.title, "Engagement Analytics Report - sandbox");
        assert!(report.markdown_summary.contains("## Platform Statistics"));
        let json: serde_json::Value = serde_json::from_str(&report.json_data).unwrap();
        assert_eq!(json["statistics"]["totalSnapshots"], 2);
    }

    #[test]
    fn test_empty_statistics() {
        let statistics = calculate_statistics(&[]);
        assert_eq!(statistics.total_snapshots, 0);
        assert!(statistics.time_range.is_none());
        assert!(statistics.by_platform.is_empty());
    }
}
