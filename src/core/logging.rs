//! Tracing subscriber setup

use crate::core::config::LoggingConfig;
use crate::core::error::PublishError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber described by `config`
///
/// `RUST_LOG` takes precedence over the configured level. Does nothing when
/// the host application already installed a subscriber.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), PublishError> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| PublishError::Config {
            message: format!("invalid log level {}: {}", config.level, e),
        })?;

    let result = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };

    result.map_err(|e| PublishError::Config {
        message: format!("failed to install tracing subscriber: {}", e),
    })
}
