use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RedisSettings;
use crate::error::CacheError;
use crate::services::cache::CacheStore;

/// Cache store shared across process instances; TTLs are enforced by the server
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisCacheStore {
    /// Connect, failing if the server cannot be reached within the configured timeout
    pub async fn connect(settings: &RedisSettings) -> Result<Self, CacheError> {
        let client = redis::Client::open(settings.url.as_str())?;

        let connection = tokio::time::timeout(settings.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::ConnectTimeout(settings.connect_timeout.as_secs()))??;

        info!(
            url = %mask_credentials(&settings.url),
            prefix = %settings.key_prefix,
            "Redis cache connected"
        );

        Ok(Self {
            connection,
            key_prefix: settings.key_prefix.clone(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(self.namespaced(key)).await?;
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let millis = ttl.as_millis().max(1) as u64;
        let _: () = conn.pset_ex(self.namespaced(key), value, millis).await?;
        debug!("Added item to Redis cache with key: {}, expires in: {}ms", key, millis);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(self.namespaced(key)).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();
        let exists: bool = conn.exists(self.namespaced(key)).await?;
        Ok(exists)
    }
}

/// Hide the password part of a redis URL for logging
fn mask_credentials(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
