//! RFC 6749 error taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::WardenError;

/// Error codes of RFC 6749 section 5.2 and the OIDC extensions used here
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    InvalidScope,
    UnauthorizedClient,
    UnsupportedGrantType,
    UnsupportedResponseType,
    AccessDenied,
    LoginRequired,
    ServerError,
}

impl OAuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidScope => "invalid_scope",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::AccessDenied => "access_denied",
            Self::LoginRequired => "login_required",
            Self::ServerError => "server_error",
        }
    }

    /// HTTP status used when the error is returned as a JSON body
    pub fn default_status(&self) -> u16 {
        match self {
            Self::InvalidClient | Self::LoginRequired => 401,
            Self::AccessDenied => 403,
            Self::ServerError => 500,
            _ => 400,
        }
    }
}

impl std::fmt::Display for OAuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire error `{error, error_description}`
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{error}: {error_description}")]
pub struct OAuthError {
    pub error: OAuthErrorCode,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_description: String,
    #[serde(skip)]
    status: Option<u16>,
}

impl OAuthError {
    pub fn new(error: OAuthErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: description.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status(&self) -> u16 {
        self.status.unwrap_or_else(|| self.error.default_status())
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorCode::InvalidRequest, description)
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorCode::InvalidClient, description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorCode::InvalidGrant, description)
    }

    pub fn unsupported_grant_type(grant_type: &str) -> Self {
        Self::new(
            OAuthErrorCode::UnsupportedGrantType,
            format!("grant type {:?} is not supported", grant_type),
        )
    }

    pub fn login_required() -> Self {
        Self::new(OAuthErrorCode::LoginRequired, "authentication is required")
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self::new(OAuthErrorCode::ServerError, description)
    }

    /// Query/fragment parameters for an error delivered through a redirect
    pub fn redirect_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("error", self.error.as_str().to_string())];
        if !self.error_description.is_empty() {
            params.push(("error_description", self.error_description.clone()));
        }
        params
    }
}

/// Collaborator failures surface as `server_error`
impl From<WardenError> for OAuthError {
    fn from(e: WardenError) -> Self {
        Self::server_error(e.to_string())
    }
}

pub type OAuthResult<T> = std::result::Result<T, OAuthError>;
