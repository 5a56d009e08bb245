//! Warden Core - Domain types and traits for the authentication core

pub mod error;
pub mod identity;
pub mod ids;
pub mod models;
pub mod traits;


pub use error::*;
pub use identity::*;
pub use ids::*;
pub use models::*;
pub use traits::*;
