//! Request pacing towards the nutrition site.
//!
//! A crawl fans out over every (hall, date) pair; this keeps the burst polite.

use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = GovLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Single shared bucket for all upstream requests.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    /// Create with a per-second limit. Zero is treated as one.
    pub fn per_second(requests: u32) -> Self {
        let rate = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);

        Self {
            limiter: Arc::new(GovLimiter::direct(Quota::per_second(rate))),
        }
    }

    /// Wait until a request slot is available.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}
