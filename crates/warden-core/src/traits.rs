//! Collaborator traits consumed by the authentication core
//!
//! Storage of users, documents and cache entries lives outside this
//! workspace; these traits are the seams it is reached through.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::{error::Result, models::*};

// =============================================================================
// Users and login records
// =============================================================================

/// User account store
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<User>>;
    async fn list(&self) -> Result<Vec<User>>;
    /// Fails if a user with the same name exists
    async fn create(&self, user: &User) -> Result<User>;
    async fn update(&self, user: &User) -> Result<User>;
}

/// Append-only login audit sink
#[async_trait]
pub trait LoginRecorder: Send + Sync {
    async fn record(&self, record: &LoginRecord) -> Result<()>;
}

// =============================================================================
// Persisted documents
// =============================================================================

/// Change notification for a persisted document
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    Added(Document),
    Updated(Document),
    Deleted(Document),
}

impl DocumentEvent {
    pub fn document(&self) -> &Document {
        match self {
            Self::Added(d) | Self::Updated(d) | Self::Deleted(d) => d,
        }
    }
}

/// Lists labeled documents
#[async_trait]
pub trait DocumentLister: Send + Sync {
    async fn list(&self, selector: &LabelSelector) -> Result<Vec<Document>>;
}

/// Delivers document change events
pub trait DocumentNotifier: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<DocumentEvent>;
}

// =============================================================================
// Token cache
// =============================================================================

/// Shared key/value store with per-entry TTL
///
/// Key patterns use `globset` syntax with `*` matching any run of
/// characters. Literal parts are escaped with `globset::escape`.
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn del(&self, keys: &[String]) -> Result<()>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
    async fn exists(&self, keys: &[String]) -> Result<bool>;
}
