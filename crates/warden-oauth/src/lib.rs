//! Warden OAuth - Tokens and the OAuth2 authorization server
//!
//! This crate provides:
//! - `TokenCodec`: HS256 JWT signing and validation
//! - `TokenManager`: token issuance, verification and revocation over the
//!   shared token cache
//! - `ClientResolver`: OAuth client lookup from persisted documents
//! - `AuthorizationServer`: authorize, token, callback, logout, revoke and
//!   token review handlers, independent of any HTTP framework

pub mod clients;
pub mod error;
pub mod jwt;
pub mod server;
pub mod tokens;


pub use clients::ClientResolver;
pub use error::{OAuthError, OAuthErrorCode, OAuthResult};
pub use jwt::{Claims, TokenCodec, TokenType};
pub use server::{
    AuthorizationServer, AuthorizeRequest, LogoutOutcome, LogoutRequest, TokenRequest,
    TokenReview, TokenReviewSpec, TokenReviewStatus,
};
pub use tokens::{TokenManager, TokenPair, TokenSettings};
