//! Per-platform metric payloads
//!
//! Each platform reports engagement under its own names and nesting. The
//! adapters decode into one variant of [`PlatformMetrics`] and normalize it
//! before anything leaves the adapter.

use crate::core::model::Metrics;
use serde::{Deserialize, Serialize};

/// Raw counters as reported by one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PlatformMetrics {
    Facebook(FacebookInsights),
    LinkedIn(LinkedInStatistics),
    Sandbox(Metrics),
}

/// Graph insights plus reaction, comment and share summaries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacebookInsights {
    pub post_impressions: u64,
    pub post_impressions_unique: u64,
    pub post_clicks: u64,
    pub reactions: u64,
    pub comments: u64,
    pub shares: u64,
}

/// Share statistics, with social action counts as a fallback source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedInStatistics {
    pub impression_count: Option<u64>,
    pub unique_impressions_count: Option<u64>,
    pub click_count: Option<u64>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub share_count: Option<u64>,
    pub engagement: Option<f64>,
    /// `likesSummary.totalLikes` from socialActions
    pub social_likes: Option<u64>,
    /// `commentsSummary.aggregatedTotalComments` from socialActions
    pub social_comments: Option<u64>,
}

impl PlatformMetrics {
    /// Map into the common shape; missing counters become zero
    pub fn normalize(&self) -> Metrics {
        match self {
            PlatformMetrics::Facebook(insights) => Metrics {
                impressions: insights.post_impressions,
                reach: insights.post_impressions_unique,
                likes: insights.reactions,
                comments: insights.comments,
                shares: insights.shares,
                clicks: insights.post_clicks,
                engagement_rate: 0.0,
            }
            .with_derived_rate(),
            PlatformMetrics::LinkedIn(stats) => Metrics {
                impressions: stats.impression_count.unwrap_or(0),
                reach: stats.unique_impressions_count.unwrap_or(0),
                likes: stats.like_count.or(stats.social_likes).unwrap_or(0),
                comments: stats.comment_count.or(stats.social_comments).unwrap_or(0),
                shares: stats.share_count.unwrap_or(0),
                clicks: stats.click_count.unwrap_or(0),
                engagement_rate: stats.engagement.filter(|e| e.is_finite()).unwrap_or(0.0),
            }
            .with_derived_rate(),
            PlatformMetrics::Sandbox(metrics) => metrics.clone().with_derived_rate(),
        }
    }
}
