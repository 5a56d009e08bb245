//! In-memory token cache

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use globset::{GlobBuilder, GlobMatcher};
use std::time::Duration;
use tracing::instrument;

use warden_core::{Result, TokenCache, WardenError};

struct CachedEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Process-local TokenCache with lazy expiry
///
/// Expired entries are invisible to every operation and are dropped when
/// touched or during `purge_expired`.
#[derive(Default)]
pub struct InMemoryTokenCache {
    entries: DashMap<String, CachedEntry>,
}

impl InMemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now();
        let value = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if value.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(value)
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| WardenError::cache_error(format!("Invalid TTL: {}", e)))?;
        self.entries.insert(
            key.to_string(),
            CachedEntry {
                value: value.to_string(),
                expires_at: Utc::now() + ttl,
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = key_matcher(pattern)?;
        let now = Utc::now();
        Ok(self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now) && matcher.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn exists(&self, keys: &[String]) -> Result<bool> {
        let now = Utc::now();
        Ok(keys.iter().any(|key| {
            self.entries
                .get(key)
                .is_some_and(|entry| !entry.is_expired(now))
        }))
    }
}

/// Compile a key pattern in `globset` syntax
///
/// Backslashes are literal; metacharacters are escaped with `globset::escape`.
fn key_matcher(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .backslash_escape(false)
        .build()
        .map_err(|e| WardenError::cache_error(format!("Invalid key pattern {:?}: {}", pattern, e)))?;
    Ok(glob.compile_matcher())
}
