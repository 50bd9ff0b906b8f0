//! Plugin Loader - Registry of provider adapters
//!
//! This module maps each platform to the adapter that serves it. The
//! scheduler, resolver and collector look adapters up here instead of
//! constructing them.
//!
//! # Example
//!
//! ```no_run
//! use social_publisher::core::config::PublisherConfig;
//! use social_publisher::core::model::Platform;
//! use social_publisher::plugins::PluginLoader;
//!
//! # fn example() -> Result<(), social_publisher::core::PublishError> {
//! let loader = PluginLoader::from_config(&PublisherConfig::default())?;
//! let facebook = loader.load_plugin(Platform::Facebook)?;
//! println!("{} accepts {} characters", facebook.platform(), facebook.capabilities().max_content_length);
//! # Ok(())
//! # }
//! ```

use crate::core::config::PublisherConfig;
use crate::core::error::PublishError;
use crate::core::model::Platform;
use crate::core::rate_limit::ChannelRateLimiter;
use crate::core::traits::ProviderAdapter;
use crate::plugins::facebook_plugin::FacebookPlugin;
use crate::plugins::linkedin_plugin::LinkedInPlugin;
use crate::plugins::rate_limited::RateLimitedAdapter;
use crate::plugins::sandbox_plugin::SandboxPlugin;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of adapters keyed by platform
#[derive(Default, Clone)]
pub struct PluginLoader {
    adapters: BTreeMap<Platform, Arc<dyn ProviderAdapter>>,
}

impl PluginLoader {
    /// Create an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the adapters enabled in the configuration
    ///
    /// Facebook and LinkedIn are enabled unless switched off; the sandbox
    /// only when `providers.sandbox.enabled` is set.
    pub fn from_config(config: &PublisherConfig) -> Result<Self, PublishError> {
        let providers = config.providers();
        let timeout = config.scheduler().request_timeout();
        let mut loader = Self::new();

        let facebook = providers.facebook.unwrap_or_default();
        if facebook.enabled {
            loader.register(Arc::new(FacebookPlugin::new(&facebook, timeout)?));
        }

        let linkedin = providers.linkedin.unwrap_or_default();
        if linkedin.enabled {
            loader.register(Arc::new(LinkedInPlugin::new(&linkedin, timeout)?));
        }

        if let Some(sandbox) = providers.sandbox
            && sandbox.enabled
        {
            loader.register(Arc::new(SandboxPlugin::new(&sandbox)));
        }

        Ok(loader)
    }

    /// Register an adapter, replacing any previous one for its platform
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) -> &mut Self {
        let platform = adapter.platform();
        debug!(%platform, "registering provider adapter");
        self.adapters.insert(platform, adapter);
        self
    }

    /// Route every registered adapter through a shared rate limiter
    ///
    /// Adapters registered afterwards are not wrapped.
    pub fn with_rate_limiter(self, limiter: Arc<ChannelRateLimiter>) -> Self {
        let adapters = self
            .adapters
            .into_iter()
            .map(|(platform, adapter)| {
                let limited: Arc<dyn ProviderAdapter> =
                    Arc::new(RateLimitedAdapter::new(adapter, limiter.clone()));
                (platform, limited)
            })
            .collect();
        Self { adapters }
    }

    /// Get the adapter for a platform
    pub fn load_plugin(&self, platform: Platform) -> Result<Arc<dyn ProviderAdapter>, PublishError> {
        self.adapters
            .get(&platform)
            .cloned()
            .ok_or_else(|| PublishError::UnsupportedOperation {
                platform: platform.to_string(),
                operation: "no adapter registered".to_string(),
            })
    }

    /// Registered platforms, in stable order
    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
