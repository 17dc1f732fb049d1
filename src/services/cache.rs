//! Cache-aside layer over interchangeable backends.
//!
//! Values are stored as JSON strings. Backend failures and undecodable
//! payloads are never surfaced to callers: reads degrade to a miss and writes
//! are logged and skipped.
//!
//! `get_or_set` coalesces concurrent misses on the same key. The first caller
//! computes; the others wait for it and then read the stored value. If the
//! computation fails, nothing is stored and one of the waiters computes
//! instead. A key invalidated while its computation is running keeps the
//! result out of the store, so an older build never lands after a newer write.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{CacheSettings, RedisSettings};
use crate::error::CacheError;
use crate::services::memory_cache::MemoryCacheStore;
use crate::services::redis_cache::RedisCacheStore;

/// Raw string store with per-entry TTL
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Live (unexpired) value for `key`
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
}

/// Pick the distributed store when enabled and reachable, else the local one
pub async fn build_cache_store(cache: &CacheSettings, redis: &RedisSettings) -> Arc<dyn CacheStore> {
    if cache.use_redis {
        match RedisCacheStore::connect(redis).await {
            Ok(store) => {
                info!("Creating Redis cache service");
                return Arc::new(store);
            }
            Err(e) => {
                warn!(error = %e, "Redis unreachable, falling back to memory cache");
            }
        }
    }

    info!("Creating memory cache service");
    Arc::new(MemoryCacheStore::new(cache.max_capacity))
}

struct FlightEntry {
    done: watch::Receiver<()>,
    stale: Arc<AtomicBool>,
}

type InFlight = Arc<Mutex<HashMap<String, FlightEntry>>>;

/// Registration of the caller computing a key; dropping it releases waiters
struct FlightGuard {
    key: String,
    in_flight: InFlight,
    stale: Arc<AtomicBool>,
    _done: watch::Sender<()>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

enum Flight {
    Leader(FlightGuard),
    Follower(watch::Receiver<()>),
}

/// Typed cache-aside front end shared by every service
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
    in_flight: InFlight,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>, default_ttl: Duration) -> Self {
        Self {
            store,
            default_ttl,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// In-process cache, mostly for tests and tools
    pub fn in_memory(default_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCacheStore::default()), default_ttl)
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get_raw(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Failed to deserialize cache item, removing it");
                self.remove(key).await;
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache item, skipping");
                return;
            }
        };

        match self.store.set_raw(key, raw, ttl).await {
            Ok(()) => debug!(key, ttl_secs = ttl.as_secs(), "Cached item"),
            Err(e) => warn!(key, error = %e, "Cache write failed"),
        }
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            warn!(key, error = %e, "Cache remove failed");
        }
    }

    /// Remove `key` and keep any computation already running for it from
    /// storing its result
    pub async fn invalidate(&self, key: &str) {
        if let Some(entry) = self.in_flight.lock().get(key) {
            entry.stale.store(true, Ordering::SeqCst);
            debug!("Invalidated in-flight computation for key: {}", key);
        }
        self.remove(key).await;
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self.store.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(key, error = %e, "Cache exists check failed");
                false
            }
        }
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// Errors from `compute` are returned as-is and nothing is cached.
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, ttl: Option<Duration>, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = loop {
            if let Some(value) = self.get(key).await {
                debug!("Cache hit for key: {}", key);
                return Ok(value);
            }

            match self.join_flight(key) {
                Flight::Leader(guard) => break guard,
                Flight::Follower(mut done) => {
                    debug!("Waiting on in-flight computation for key: {}", key);
                    // Resolves with Err once the leader's guard is dropped
                    let _ = done.changed().await;
                }
            }
        };

        debug!("Cache miss for key: {}, computing", key);
        let value = compute().await?;
        if guard.stale.load(Ordering::SeqCst) {
            debug!("Key {} was invalidated during computation, not storing", key);
        } else {
            self.set(key, &value, ttl).await;
        }
        Ok(value)
    }

    fn join_flight(&self, key: &str) -> Flight {
        let mut in_flight = self.in_flight.lock();
        if let Some(entry) = in_flight.get(key) {
            return Flight::Follower(entry.done.clone());
        }

        let (tx, rx) = watch::channel(());
        let stale = Arc::new(AtomicBool::new(false));
        in_flight.insert(
            key.to_string(),
            FlightEntry {
                done: rx,
                stale: stale.clone(),
            },
        );
        Flight::Leader(FlightGuard {
            key: key.to_string(),
            in_flight: self.in_flight.clone(),
            stale,
            _done: tx,
        })
    }
}
