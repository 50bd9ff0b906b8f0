pub mod facebook_plugin;
pub mod http;
pub mod linkedin_plugin;
pub mod metrics;
pub mod plugin_loader;
pub mod rate_limited;
pub mod sandbox_plugin;

pub use facebook_plugin::FacebookPlugin;
pub use linkedin_plugin::LinkedInPlugin;
pub use metrics::PlatformMetrics;
pub use plugin_loader::PluginLoader;
pub use rate_limited::RateLimitedAdapter;
pub use sandbox_plugin::{SandboxOperation, SandboxPlugin};
