//! Per-resource call throttling.
//!
//! Each named resource (an external API) gets a single slot: at most one call
//! is in flight per resource, and consecutive calls start at least
//! `1000ms / max_requests_per_second` apart. Different resources never wait
//! on each other.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Interval applied to resources that were never configured
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);

struct ResourceSlot {
    min_interval: Mutex<Duration>,
    /// Held for the whole call; stores when the previous call started
    last_call: tokio::sync::Mutex<Option<Instant>>,
}

impl ResourceSlot {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval: Mutex::new(min_interval),
            last_call: tokio::sync::Mutex::new(None),
        }
    }
}

#[derive(Clone, Default)]
pub struct RateLimiter {
    slots: Arc<Mutex<HashMap<String, Arc<ResourceSlot>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the allowed call rate for a resource (0 is treated as 1)
    pub fn configure(&self, resource: &str, max_requests_per_second: u32) {
        let interval = Duration::from_secs_f64(1.0 / f64::from(max_requests_per_second.max(1)));
        let slot = self.slot(resource);
        *slot.min_interval.lock() = interval;
        debug!(resource, interval_ms = interval.as_millis() as u64, "Configured rate limit");
    }

    pub fn min_interval(&self, resource: &str) -> Duration {
        *self.slot(resource).min_interval.lock()
    }

    /// Run `operation` once the resource's slot is free and its interval has elapsed
    pub async fn execute<F, Fut, T>(&self, resource: &str, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let slot = self.slot(resource);
        let mut last_call = slot.last_call.lock().await;

        if let Some(previous) = *last_call {
            let min_interval = *slot.min_interval.lock();
            let elapsed = previous.elapsed();
            if elapsed < min_interval {
                let wait = min_interval - elapsed;
                trace!(resource, wait_ms = wait.as_millis() as u64, "Throttling call");
                tokio::time::sleep(wait).await;
            }
        }

        *last_call = Some(Instant::now());
        operation().await
    }

    fn slot(&self, resource: &str) -> Arc<ResourceSlot> {
        self.slots
            .lock()
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(ResourceSlot::new(DEFAULT_MIN_INTERVAL)))
            .clone()
    }
}
