//! OAuth error responses

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use warden_oauth::{OAuthError, OAuthErrorCode};

/// `OAuthError` rendered as a `{error, error_description}` JSON body
#[derive(Debug)]
pub struct ApiError(pub OAuthError);

impl From<OAuthError> for ApiError {
    fn from(e: OAuthError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let challenge = matches!(
            self.0.error,
            OAuthErrorCode::InvalidClient | OAuthErrorCode::LoginRequired
        );

        let mut response = (status, Json(self.0)).into_response();
        if challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
        }
        response
    }
}
