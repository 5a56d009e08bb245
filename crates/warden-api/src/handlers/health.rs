//! Health check handlers
//!
//! - /health - component status (token cache, identity providers)
//! - /health/live - the process is running
//! - /health/ready - the token cache answers, so tokens can be verified

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::Instant;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: Vec<ComponentHealth>,
}

#[derive(Debug, Serialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

const CACHE_PROBE_KEY: &str = "health:probe";

async fn check_token_cache(state: &AppState) -> ComponentHealth {
    let start = Instant::now();
    let result = state.cache.exists(&[CACHE_PROBE_KEY.to_string()]).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(_) => ComponentHealth {
            name: "token_cache".to_string(),
            status: HealthStatus::Healthy,
            message: None,
            latency_ms,
        },
        Err(e) => {
            warn!("Token cache health check failed: {}", e);
            ComponentHealth {
                name: "token_cache".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(e.to_string()),
                latency_ms,
            }
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let cache = check_token_cache(&state).await;
    let providers = state.registry.configurations().await.len();

    let status = cache.status;
    let components = vec![
        cache,
        ComponentHealth {
            name: "identity_providers".to_string(),
            status: HealthStatus::Healthy,
            message: Some(format!("{} active", providers)),
            latency_ms: 0,
        },
    ];

    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.started_at.elapsed().as_secs(),
            components,
        }),
    )
}

pub async fn liveness() -> Json<SimpleHealthResponse> {
    Json(SimpleHealthResponse {
        status: "alive".to_string(),
    })
}

pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<SimpleHealthResponse>) {
    match check_token_cache(&state).await.status {
        HealthStatus::Healthy => (
            StatusCode::OK,
            Json(SimpleHealthResponse {
                status: "ready".to_string(),
            }),
        ),
        HealthStatus::Unhealthy => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SimpleHealthResponse {
                status: "not_ready".to_string(),
            }),
        ),
    }
}
