//! Warden Store - Backing stores for users, documents, login records and tokens
//!
//! The in-memory stores serve tests and single-node deployments. The
//! Redis-backed token cache is available behind the `redis` feature.

pub mod cache;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_cache;

#[cfg(test)]
mod tests;

pub use cache::InMemoryTokenCache;
pub use memory::{InMemoryDocumentStore, InMemoryLoginRecorder, InMemoryUserRepository};
#[cfg(feature = "redis")]
pub use redis_cache::RedisTokenCache;
