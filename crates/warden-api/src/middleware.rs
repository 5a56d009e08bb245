//! Request middleware and extractors
//!
//! - Request ID tracing
//! - Principal extraction from `Bearer` tokens or HTTP basic credentials
//! - Login context (source address, user agent) for audit records

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::debug;
use uuid::Uuid;

use warden_core::{LoginContext, LoginType, UserInfo};

use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

// =============================================================================
// Request ID
// =============================================================================

/// Request ID stored in request extensions
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Assign every request an ID, echoed in the `X-Request-ID` response header
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::now_v7().to_string();
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

// =============================================================================
// Credentials
// =============================================================================

/// Token of an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Username and password of an `Authorization: Basic` header
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let encoded = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

// =============================================================================
// Extractors
// =============================================================================

/// Source address and user agent of the caller
#[derive(Debug, Clone, Default)]
pub struct ClientContext(pub LoginContext);

impl<S: Send + Sync> FromRequestParts<S> for ClientContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_value = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let source_ip = header_value("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header_value("x-real-ip"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_default();

        Ok(Self(LoginContext {
            provider: String::new(),
            source_ip,
            user_agent: header_value(header::USER_AGENT.as_str()).unwrap_or_default(),
        }))
    }
}

/// Authenticated caller, if any
///
/// A bearer token must be an access or static token. Basic credentials are
/// checked by the password authenticator and recorded as a basic-auth login.
#[derive(Debug, Clone, Default)]
pub struct Principal(pub Option<UserInfo>);

impl FromRequestParts<AppState> for Principal {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(&parts.headers) {
            return Ok(match state.server.tokens().principal_from_token(token).await {
                Ok(user) => Self(Some(user)),
                Err(e) => {
                    debug!("Ignoring bearer token: {}", e);
                    Self(None)
                }
            });
        }

        if let Some((username, password)) = basic_credentials(&parts.headers) {
            let ClientContext(context) = ClientContext::from_request_parts(parts, state)
                .await
                .unwrap_or_default();
            return Ok(
                match state
                    .server
                    .password_authenticator()
                    .authenticate(&username, &password, None, LoginType::BasicAuth, &context)
                    .await
                {
                    Ok(user) => Self(Some(user)),
                    Err(e) => {
                        debug!("Basic authentication failed: {}", e);
                        Self(None)
                    }
                },
            );
        }

        Ok(Self(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(authorization: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(authorization).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&headers("Basic abc")), None);
    }

    #[test]
    fn test_basic_credentials() {
        let encoded = STANDARD.encode("kubectl:s3cr3t:with-colon");
        let (user, pass) = basic_credentials(&headers(&format!("Basic {}", encoded))).unwrap();
        assert_eq!(user, "kubectl");
        assert_eq!(pass, "s3cr3t:with-colon");

        assert!(basic_credentials(&headers("Basic !!!")).is_none());
    }
}
