//! Orchestration layer for social publishing
//!
//! This module provides the high-level components that drive scheduled
//! posts through the provider adapters: the publish scheduler, identifier
//! resolution, status reconciliation and analytics collection.

pub mod analytics;
pub mod identifier_resolver;
pub mod reconciler;
pub mod scheduler;
pub mod social_publisher;

// Re-export main types for convenience
pub use analytics::{
    AnalyticsCollector, AnalyticsJob, AnalyticsQuery, AnalyticsReport, AnalyticsStatistics,
    ScoreWeights, performance_score,
};
pub use identifier_resolver::{IdentifierResolver, Resolution};
pub use reconciler::StatusReconciler;
pub use scheduler::{PublishScheduler, RunSummary, SchedulerOptions, TaskOutcome};
pub use social_publisher::{PlatformReport, PostReport, SocialPublisher};
