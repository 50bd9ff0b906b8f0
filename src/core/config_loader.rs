//! Configuration file loader for social-publisher
//!
//! This module provides configuration loading, validation, and merging capabilities.

use super::config::*;
use crate::core::error::PublishError;
use crate::core::model::Platform;
use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use tracing::warn;

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".social-publisher.yaml";

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SOCIAL_PUBLISHER_";

/// Environment variable pattern (${VAR_NAME})
static ENV_VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is a valid regex")
});

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project path to load config from
    pub project_path: PathBuf,

    /// Explicit config file replacing the project file
    pub config_file: Option<PathBuf>,

    /// CLI arguments (highest priority)
    pub cli_args: Option<PublisherConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

impl ConfigLoadOptions {
    /// Options for the current directory and process environment
    pub fn from_env() -> Self {
        Self {
            project_path: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            cli_args: None,
            env: env::vars().collect(),
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "scheduler.workers")
    pub field: String,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables (`SOCIAL_PUBLISHER_*`)
    /// 3. Project config (./.social-publisher.yaml or an explicit file)
    /// 4. Global config (~/.social-publisher.yaml)
    /// 5. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<PublisherConfig, PublishError> {
        let mut configs: Vec<PublisherConfig> = vec![PublisherConfig::default()];

        if let Some(global_config) = Self::load_global_config(&options.env).await? {
            configs.push(global_config);
        }

        let project_config = match &options.config_file {
            Some(path) => Some(Self::load_config_file(path).await?.ok_or_else(|| {
                PublishError::Config {
                    message: format!("config file {} does not exist", path.display()),
                }
            })?),
            None => Self::load_project_config(&options.project_path).await?,
        };
        if let Some(project_config) = project_config {
            configs.push(project_config);
        }

        let mut merged = Self::merge_configs(configs);
        Self::apply_env_overrides(&mut merged, &options.env)?;

        if let Some(cli_config) = options.cli_args {
            Self::merge_into(&mut merged, cli_config);
        }

        Ok(Self::expand_env_vars(merged, &options.env))
    }

    /// Load global configuration from ~/.social-publisher.yaml
    async fn load_global_config(
        env: &HashMap<String, String>,
    ) -> Result<Option<PublisherConfig>, PublishError> {
        let Some(home_dir) = env.get("HOME") else {
            return Ok(None);
        };
        let global_config_path = PathBuf::from(home_dir).join(CONFIG_FILENAME);

        Self::load_config_file(&global_config_path).await
    }

    async fn load_project_config(
        project_path: &Path,
    ) -> Result<Option<PublisherConfig>, PublishError> {
        Self::load_config_file(&project_path.join(CONFIG_FILENAME)).await
    }

    /// Load configuration from YAML file
    fn load_config_file(
        file_path: &Path,
    ) -> std::pin::Pin<
        Box<
            dyn std::future::Future<Output = Result<Option<PublisherConfig>, PublishError>>
                + Send
                + '_,
        >,
    > {
        Box::pin(async move {
            if fs::metadata(file_path).await.is_err() {
                return Ok(None);
            }

            let content = fs::read_to_string(file_path)
                .await
                .map_err(|e| PublishError::Config {
                    message: format!("failed to read {}: {}", file_path.display(), e),
                })?;

            let config: PublisherConfig =
                serde_yaml::from_str(&content).map_err(|e| PublishError::Config {
                    message: format!("failed to parse {}: {}", file_path.display(), e),
                })?;

            if let Some(extends_path) = &config.extends {
                let base_path = file_path
                    .parent()
                    .ok_or_else(|| PublishError::Config {
                        message: "invalid config file path".to_string(),
                    })?
                    .join(extends_path);

                if let Some(base_config) = Self::load_config_file(&base_path).await? {
                    return Ok(Some(Self::merge_configs(vec![base_config, config])));
                }
                warn!(path = %base_path.display(), "extended config file not found");
            }

            Ok(Some(config))
        })
    }

    /// Apply `SOCIAL_PUBLISHER_*` overrides onto the merged configuration
    fn apply_env_overrides(
        config: &mut PublisherConfig,
        env: &HashMap<String, String>,
    ) -> Result<(), PublishError> {
        let var = |name: &str| env.get(&format!("{}{}", ENV_PREFIX, name));

        fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, PublishError> {
            value.trim().parse().map_err(|_| PublishError::Config {
                message: format!("{}{} has an invalid value: {}", ENV_PREFIX, name, value),
            })
        }

        if let Some(value) = var("WORKERS") {
            config.scheduler.get_or_insert_with(Default::default).workers =
                parse("WORKERS", value)?;
        }
        if let Some(value) = var("MAX_RETRIES") {
            config.scheduler.get_or_insert_with(Default::default).max_retries =
                parse("MAX_RETRIES", value)?;
        }
        if let Some(value) = var("REQUEST_TIMEOUT_SECS") {
            config
                .scheduler
                .get_or_insert_with(Default::default)
                .request_timeout_secs = parse("REQUEST_TIMEOUT_SECS", value)?;
        }
        if let Some(value) = var("LOG_LEVEL") {
            config.logging.get_or_insert_with(Default::default).level = value.clone();
        }
        if let Some(value) = var("LOG_JSON") {
            config.logging.get_or_insert_with(Default::default).json = value == "true";
        }
        if let Some(value) = var("STORE_PATH") {
            config.store.get_or_insert_with(Default::default).path = Some(value.clone());
        }
        if let Some(value) = var("WEBHOOK_URL") {
            let notifications = config.notifications.get_or_insert_with(Default::default);
            notifications.enabled = true;
            notifications.webhook_url = Some(value.clone());
        }
        if var("SANDBOX").map(|s| s.as_str()) == Some("true") {
            config
                .providers
                .get_or_insert_with(Default::default)
                .sandbox
                .get_or_insert_with(Default::default)
                .enabled = true;
        }

        Ok(())
    }

    /// Merge multiple configurations with priority
    fn merge_configs(configs: Vec<PublisherConfig>) -> PublisherConfig {
        let mut result = PublisherConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Merge source config into target, section by section
    fn merge_into(target: &mut PublisherConfig, source: PublisherConfig) {
        if !source.version.is_empty() {
            target.version = source.version;
        }
        if source.extends.is_some() {
            target.extends = source.extends;
        }
        if source.scheduler.is_some() {
            target.scheduler = source.scheduler;
        }

        if let Some(source_providers) = source.providers {
            let target_providers = target.providers.get_or_insert_with(Default::default);
            if source_providers.facebook.is_some() {
                target_providers.facebook = source_providers.facebook;
            }
            if source_providers.linkedin.is_some() {
                target_providers.linkedin = source_providers.linkedin;
            }
            if source_providers.sandbox.is_some() {
                target_providers.sandbox = source_providers.sandbox;
            }
        }

        if let Some(source_limits) = source.rate_limits {
            target
                .rate_limits
                .get_or_insert_with(HashMap::new)
                .extend(source_limits);
        }

        if source.resolver.is_some() {
            target.resolver = source.resolver;
        }
        if source.analytics.is_some() {
            target.analytics = source.analytics;
        }
        if source.notifications.is_some() {
            target.notifications = source.notifications;
        }
        if source.logging.is_some() {
            target.logging = source.logging;
        }
        if source.store.is_some() {
            target.store = source.store;
        }
    }

    /// Expand `${VAR}` references in URLs and account identifiers
    fn expand_env_vars(mut config: PublisherConfig, env: &HashMap<String, String>) -> PublisherConfig {
        if let Some(providers) = &mut config.providers {
            if let Some(facebook) = &mut providers.facebook {
                facebook.base_url = Self::expand_string(&facebook.base_url, env);
                facebook.page_id = facebook.page_id.as_deref().map(|s| Self::expand_string(s, env));
            }
            if let Some(linkedin) = &mut providers.linkedin {
                linkedin.base_url = Self::expand_string(&linkedin.base_url, env);
                linkedin.organization_id = linkedin
                    .organization_id
                    .as_deref()
                    .map(|s| Self::expand_string(s, env));
            }
        }

        if let Some(notifications) = &mut config.notifications
            && let Some(url) = &notifications.webhook_url
        {
            notifications.webhook_url = Some(Self::expand_string(url, env));
        }

        if let Some(store) = &mut config.store
            && let Some(path) = &store.path
        {
            store.path = Some(Self::expand_string(path, env));
        }

        config
    }

    /// Expand environment variables in a single string
    ///
    /// Unknown variables are left in place and logged.
    fn expand_string(input: &str, env: &HashMap<String, String>) -> String {
        ENV_VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                match env.get(var_name) {
                    Some(value) => value.clone(),
                    None => {
                        warn!(variable = var_name, "environment variable not found");
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }

    /// Validate configuration
    pub fn validate(config: &PublisherConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if config.version.is_empty() {
            errors.push(ConfigValidationError {
                field: "version".to_string(),
                message: "Version is required".to_string(),
                expected: Some("string (e.g., \"1.0\")".to_string()),
                actual: Some("empty".to_string()),
            });
        } else if config.version != "1.0" {
            warnings.push(ConfigValidationWarning {
                field: "version".to_string(),
                message: format!("Unknown version: {}", config.version),
                suggestion: Some("Currently supported version is \"1.0\" only".to_string()),
            });
        }

        Self::validate_scheduler(&config.scheduler(), &mut errors, &mut warnings);
        Self::validate_rate_limits(config, &mut errors, &mut warnings);
        Self::validate_resolver(&config.resolver(), &mut warnings);
        Self::validate_analytics(&config.analytics(), &mut errors);
        Self::validate_notifications(&config.notifications(), &mut errors, &mut warnings);

        let level = config.logging().level;
        if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
            errors.push(ConfigValidationError {
                field: "logging.level".to_string(),
                message: format!("Unknown log level: {}", level),
                expected: Some(LOG_LEVELS.join(" | ")),
                actual: Some(level),
            });
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn validate_scheduler(
        scheduler: &SchedulerConfig,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        let positive = [
            ("scheduler.workers", scheduler.workers as u64),
            ("scheduler.batchSize", scheduler.batch_size as u64),
            ("scheduler.pollIntervalSecs", scheduler.poll_interval_secs),
            ("scheduler.requestTimeoutSecs", scheduler.request_timeout_secs),
        ];

        for (field, value) in positive {
            if value == 0 {
                errors.push(ConfigValidationError {
                    field: field.to_string(),
                    message: format!("{} must be greater than zero", field),
                    expected: Some("positive integer".to_string()),
                    actual: Some("0".to_string()),
                });
            }
        }

        if scheduler.backoff_base_secs > scheduler.backoff_max_secs {
            errors.push(ConfigValidationError {
                field: "scheduler.backoffBaseSecs".to_string(),
                message: "backoffBaseSecs exceeds backoffMaxSecs".to_string(),
                expected: Some(format!("<= {}", scheduler.backoff_max_secs)),
                actual: Some(scheduler.backoff_base_secs.to_string()),
            });
        }

        if scheduler.max_retries == 0 {
            warnings.push(ConfigValidationWarning {
                field: "scheduler.maxRetries".to_string(),
                message: "Transient failures will fail tasks immediately".to_string(),
                suggestion: Some("Set maxRetries to at least 1".to_string()),
            });
        }
    }

    fn validate_rate_limits(
        config: &PublisherConfig,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        let Some(limits) = &config.rate_limits else {
            return;
        };

        for (name, limit) in limits {
            if name.parse::<Platform>().is_err() {
                errors.push(ConfigValidationError {
                    field: format!("rateLimits.{}", name),
                    message: format!("Unknown platform: {}", name),
                    expected: Some("facebook | linkedin | sandbox".to_string()),
                    actual: Some(name.clone()),
                });
            }
            if limit.requests_per_minute > 0 && limit.burst == 0 {
                warnings.push(ConfigValidationWarning {
                    field: format!("rateLimits.{}.burst", name),
                    message: "burst of 0 is treated as 1".to_string(),
                    suggestion: None,
                });
            }
        }
    }

    fn validate_resolver(resolver: &ResolverConfig, warnings: &mut Vec<ConfigValidationWarning>) {
        if resolver.listing_page_size != resolver.page_size() {
            warnings.push(ConfigValidationWarning {
                field: "resolver.listingPageSize".to_string(),
                message: format!(
                    "listingPageSize {} is clamped to {}",
                    resolver.listing_page_size,
                    resolver.page_size()
                ),
                suggestion: Some(format!(
                    "Use a value between {} and {}",
                    LISTING_PAGE_MIN, LISTING_PAGE_MAX
                )),
            });
        }
    }

    fn validate_analytics(analytics: &AnalyticsConfig, errors: &mut Vec<ConfigValidationError>) {
        let weights = [
            ("analytics.likeWeight", analytics.like_weight),
            ("analytics.commentWeight", analytics.comment_weight),
            ("analytics.shareWeight", analytics.share_weight),
            ("analytics.clickWeight", analytics.click_weight),
        ];

        for (field, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                errors.push(ConfigValidationError {
                    field: field.to_string(),
                    message: "weights must be non-negative".to_string(),
                    expected: Some(">= 0".to_string()),
                    actual: Some(weight.to_string()),
                });
            }
        }
    }

    fn validate_notifications(
        notifications: &NotificationsConfig,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        match &notifications.webhook_url {
            None if notifications.enabled => warnings.push(ConfigValidationWarning {
                field: "notifications.webhookUrl".to_string(),
                message: "Notifications are enabled without a webhook URL".to_string(),
                suggestion: Some("Set webhookUrl or SOCIAL_PUBLISHER_WEBHOOK_URL".to_string()),
            }),
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                errors.push(ConfigValidationError {
                    field: "notifications.webhookUrl".to_string(),
                    message: "webhookUrl must be an http(s) URL".to_string(),
                    expected: Some("https://...".to_string()),
                    actual: Some(url.clone()),
                })
            }
            _ => {}
        }
    }

    /// Format validation result as human-readable string
    pub fn format_validation_result(result: &ConfigValidationResult) -> String {
        let mut lines = Vec::new();

        if result.valid {
            lines.push("✅ Configuration validation succeeded".to_string());
        } else {
            lines.push("❌ Configuration has errors".to_string());
        }

        if !result.errors.is_empty() {
            lines.push("\n🔴 Errors:".to_string());
            for error in &result.errors {
                lines.push(format!("  - [{}] {}", error.field, error.message));
                if let (Some(expected), Some(actual)) = (&error.expected, &error.actual) {
                    lines.push(format!("    Expected: {}", expected));
                    lines.push(format!("    Actual: {}", actual));
                }
            }
        }

        if !result.warnings.is_empty() {
            lines.push("\n🟡 Warnings:".to_string());
            for warning in &result.warnings {
                lines.push(format!("  - [{}] {}", warning.field, warning.message));
                if let Some(suggestion) = &warning.suggestion {
                    lines.push(format!("    Suggestion: {}", suggestion));
                }
            }
        }

        lines.join("\n")
    }
}
