//! Per-(provider, channel) rate limiting
//!
//! Each channel gets its own GCRA token bucket from `governor`, shared by all
//! workers that target it. Callers wait for capacity instead of failing, up
//! to a bounded number of queued waiters; beyond that the request is
//! rejected as rate limited so the scheduler requeues it.

use crate::core::error::PublishError;
use crate::core::model::Platform;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::debug;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Quota for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Sustained rate; zero disables limiting
    pub requests_per_minute: u32,
    /// Requests allowed back to back
    pub burst: u32,
    /// Maximum callers waiting on one channel
    pub max_queue_depth: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst: 10,
            max_queue_depth: 32,
        }
    }
}

struct ChannelBucket {
    limiter: Option<DirectRateLimiter>,
    waiters: Semaphore,
}

impl ChannelBucket {
    fn new(settings: RateLimitSettings) -> Self {
        let limiter = NonZeroU32::new(settings.requests_per_minute).map(|rpm| {
            let burst = NonZeroU32::new(settings.burst).unwrap_or(NonZeroU32::MIN);
            RateLimiter::direct(Quota::per_minute(rpm).allow_burst(burst))
        });

        Self {
            limiter,
            waiters: Semaphore::new(settings.max_queue_depth),
        }
    }
}

/// Registry of token buckets keyed by (platform, channel id)
pub struct ChannelRateLimiter {
    settings: HashMap<Platform, RateLimitSettings>,
    fallback: RateLimitSettings,
    buckets: Mutex<HashMap<(Platform, String), Arc<ChannelBucket>>>,
}

impl Default for ChannelRateLimiter {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl ChannelRateLimiter {
    pub fn new(settings: HashMap<Platform, RateLimitSettings>) -> Self {
        Self {
            settings,
            fallback: RateLimitSettings::default(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter that never waits, for tests and sandbox runs
    pub fn unlimited() -> Self {
        let mut limiter = Self::new(HashMap::new());
        limiter.fallback = RateLimitSettings {
            requests_per_minute: 0,
            burst: 0,
            max_queue_depth: usize::from(u16::MAX),
        };
        limiter
    }

    fn bucket(&self, platform: Platform, channel_id: &str) -> Arc<ChannelBucket> {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        buckets
            .entry((platform, channel_id.to_string()))
            .or_insert_with(|| {
                let settings = self
                    .settings
                    .get(&platform)
                    .copied()
                    .unwrap_or(self.fallback);
                Arc::new(ChannelBucket::new(settings))
            })
            .clone()
    }

    /// Wait until the channel has capacity for one more request
    pub async fn acquire(&self, platform: Platform, channel_id: &str) -> Result<(), PublishError> {
        let bucket = self.bucket(platform, channel_id);

        let _slot = bucket
            .waiters
            .try_acquire()
            .map_err(|_| PublishError::RateLimited {
                platform: platform.to_string(),
                message: format!("local request queue for channel {} is full", channel_id),
                retry_after: None,
            })?;

        if let Some(limiter) = &bucket.limiter
            && limiter.check().is_err()
        {
            debug!(%platform, channel_id, "waiting for rate limit capacity");
            limiter.until_ready().await;
        }

        Ok(())
    }
}
