//! OAuth2 endpoint handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use warden_core::CallbackRequest;
use warden_oauth::{
    AuthorizeRequest, LogoutOutcome, LogoutRequest, TokenPair, TokenRequest, TokenReview,
};

use crate::error::ApiError;
use crate::middleware::{basic_credentials, ClientContext, Principal};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub token_type_hint: String,
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn token_response(pair: TokenPair) -> Response {
    (
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(pair),
    )
        .into_response()
}

async fn authorize(state: AppState, principal: Principal, request: AuthorizeRequest) -> Result<Response, ApiError> {
    let redirect = state
        .server
        .authorize(&request, principal.0.as_ref())
        .await?;
    Ok(found(redirect))
}

pub async fn authorize_get(
    State(state): State<AppState>,
    principal: Principal,
    Query(request): Query<AuthorizeRequest>,
) -> Result<Response, ApiError> {
    authorize(state, principal, request).await
}

pub async fn authorize_post(
    State(state): State<AppState>,
    principal: Principal,
    Form(request): Form<AuthorizeRequest>,
) -> Result<Response, ApiError> {
    authorize(state, principal, request).await
}

/// Token endpoint; client credentials come from the form or a basic
/// `Authorization` header
pub async fn token(
    State(state): State<AppState>,
    ClientContext(context): ClientContext,
    headers: HeaderMap,
    Form(mut request): Form<TokenRequest>,
) -> Result<Response, ApiError> {
    if request.client_id.is_empty() {
        if let Some((client_id, client_secret)) = basic_credentials(&headers) {
            request.client_id = client_id;
            request.client_secret = client_secret;
        }
    }

    let pair = state.server.token(&request, &context).await?;
    Ok(token_response(pair))
}

pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    ClientContext(context): ClientContext,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let pair = state
        .server
        .callback(&provider, &CallbackRequest::new(query), &context)
        .await?;
    Ok(token_response(pair))
}

async fn logout(state: AppState, principal: Principal, request: LogoutRequest) -> Result<Response, ApiError> {
    match state.server.logout(principal.0.as_ref(), &request).await? {
        LogoutOutcome::Done => Ok(Json(json!({"message": "logged out"})).into_response()),
        LogoutOutcome::Redirect(location) => Ok(found(location)),
    }
}

pub async fn logout_get(
    State(state): State<AppState>,
    principal: Principal,
    Query(request): Query<LogoutRequest>,
) -> Result<Response, ApiError> {
    logout(state, principal, request).await
}

pub async fn logout_post(
    State(state): State<AppState>,
    principal: Principal,
    Form(request): Form<LogoutRequest>,
) -> Result<Response, ApiError> {
    logout(state, principal, request).await
}

/// Token revocation (RFC 7009); unknown tokens are not an error
pub async fn revoke(
    State(state): State<AppState>,
    Form(request): Form<RevokeRequest>,
) -> Result<StatusCode, ApiError> {
    state.server.revoke(&request.token).await?;
    Ok(StatusCode::OK)
}

/// Webhook token review
pub async fn authenticate(
    State(state): State<AppState>,
    Json(review): Json<TokenReview>,
) -> Json<TokenReview> {
    Json(state.server.review(review).await)
}
