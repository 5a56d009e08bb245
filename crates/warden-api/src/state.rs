//! Application state for API handlers

use std::sync::Arc;
use std::time::Instant;

use warden_core::TokenCache;
use warden_identity::ProviderRegistry;
use warden_oauth::AuthorizationServer;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<AuthorizationServer>,
    pub registry: Arc<ProviderRegistry>,
    /// Probed by the readiness endpoint
    pub cache: Arc<dyn TokenCache>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        server: Arc<AuthorizationServer>,
        registry: Arc<ProviderRegistry>,
        cache: Arc<dyn TokenCache>,
    ) -> Self {
        Self {
            server,
            registry,
            cache,
            started_at: Instant::now(),
        }
    }
}
