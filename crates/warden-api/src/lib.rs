//! Warden API - HTTP surface of the authorization server
//!
//! Routes:
//! - `/oauth/authorize`, `/oauth/token`, `/oauth/callback/{provider}`,
//!   `/oauth/logout`, `/oauth/revoke`, `/oauth/authenticate`
//! - `/health`, `/health/live`, `/health/ready`
//!
//! Every response carries an `X-Request-ID` header.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

#[cfg(test)]
mod tests;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
