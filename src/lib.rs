pub mod core;
pub mod notifications;
pub mod orchestration;
pub mod plugins;
pub mod security;
pub mod validation;

pub use crate::core::config::PublisherConfig;
pub use crate::core::config_loader::{ConfigLoadOptions, ConfigLoader};
pub use crate::core::*;
pub use notifications::{LogNotifier, Notification, NotificationSink, WebhookNotifier};
pub use orchestration::{
    AnalyticsCollector, AnalyticsQuery, IdentifierResolver, PostReport, PublishScheduler,
    RunSummary, SocialPublisher, StatusReconciler,
};
pub use plugins::{FacebookPlugin, LinkedInPlugin, PluginLoader, SandboxOperation, SandboxPlugin};
pub use security::{SecureTokenStore, TokenStore};
pub use validation::ContentValidator;
