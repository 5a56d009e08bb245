//! Redis-backed token cache

use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, instrument};

use warden_core::{Result, TokenCache, WardenError};

/// TokenCache shared across replicas through Redis
#[derive(Clone)]
pub struct RedisTokenCache {
    client: redis::Client,
}

impl RedisTokenCache {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| WardenError::cache_error(format!("Invalid Redis URL: {}", e)))?;
        Ok(Self::new(client))
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)
    }
}

fn map_redis_error(e: redis::RedisError) -> WardenError {
    WardenError::cache_error(e.to_string())
}

/// Rewrite a `globset` key pattern for `KEYS`
///
/// Redis treats a backslash as an escape and reads `[]]` as an empty class.
fn redis_pattern(pattern: &str) -> String {
    pattern.replace('\\', r"\\").replace("[]]", r"\]")
}

#[async_trait]
impl TokenCache for RedisTokenCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get(key).await.map_err(map_redis_error)
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(map_redis_error)
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(keys).await.map_err(map_redis_error)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn
            .keys(redis_pattern(pattern))
            .await
            .map_err(map_redis_error)?;
        debug!(pattern, count = keys.len(), "Listed cache keys");
        Ok(keys)
    }

    async fn exists(&self, keys: &[String]) -> Result<bool> {
        if keys.is_empty() {
            return Ok(false);
        }
        let mut conn = self.connection().await?;
        let count: u64 = conn.exists(keys).await.map_err(map_redis_error)?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_pattern_keeps_escaped_literals() {
        assert_eq!(redis_pattern("user:*:token:abc"), "user:*:token:abc");
        assert_eq!(
            redis_pattern(&globset::escape("a*b]c")),
            r"a[*]b\]c"
        );
        assert_eq!(redis_pattern(r"a\b"), r"a\\b");
    }
}
