//! HTTP handlers

pub mod health;
pub mod oauth;

pub use health::{health_check, liveness, readiness};
