//! API route definitions

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::{self, oauth};
use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::liveness))
        .route("/health/ready", get(handlers::readiness))
        .nest("/oauth", oauth_routes())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

fn oauth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/authorize",
            get(oauth::authorize_get).post(oauth::authorize_post),
        )
        .route("/token", post(oauth::token))
        .route("/callback/{provider}", get(oauth::callback))
        .route("/logout", get(oauth::logout_get).post(oauth::logout_post))
        .route("/revoke", post(oauth::revoke))
        .route("/authenticate", post(oauth::authenticate))
}
