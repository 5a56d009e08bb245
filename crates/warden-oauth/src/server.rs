//! Authorization server state machine
//!
//! Framework-agnostic: handlers take decoded request parameters and an
//! optional authenticated principal and return either a redirect target, a
//! JSON-serializable body or an `OAuthError`. Errors are only delivered
//! through a redirect once the client and its redirect URI are proven.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::{form_urlencoded, Url};

use warden_core::{
    CallbackRequest, Client, GrantMethod, LoginContext, LoginType, UserInfo, WardenError,
};
use warden_identity::{OAuthAuthenticator, PasswordAuthenticator, UserMapper};

use crate::clients::ClientResolver;
use crate::error::{OAuthError, OAuthErrorCode, OAuthResult};
use crate::jwt::{Claims, TokenType};
use crate::tokens::{TokenManager, TokenPair};

/// Scopes the server understands
pub const SUPPORTED_SCOPES: &[&str] = &["openid", "email", "profile", "offline_access", "groups"];
/// Response types the server understands
pub const SUPPORTED_RESPONSE_TYPES: &[&str] = &["code", "token", "id_token"];

pub const GRANT_TYPE_PASSWORD: &str = "password";
pub const GRANT_TYPE_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";

// =============================================================================
// Requests and responses
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub nonce: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Identity provider for the password grant; empty authenticates locally
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub post_logout_redirect_uri: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogoutOutcome {
    Done,
    Redirect(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenReviewSpec {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenReviewStatus {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

/// Webhook token review `{spec: {token}}` answered with `{status: {...}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenReview {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub spec: TokenReviewSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TokenReviewStatus>,
}

// =============================================================================
// Authorization server
// =============================================================================

pub struct AuthorizationServer {
    clients: ClientResolver,
    tokens: Arc<TokenManager>,
    password: Arc<PasswordAuthenticator>,
    oauth: Arc<OAuthAuthenticator>,
    mapper: Arc<UserMapper>,
}

impl AuthorizationServer {
    pub fn new(
        clients: ClientResolver,
        tokens: Arc<TokenManager>,
        password: Arc<PasswordAuthenticator>,
        oauth: Arc<OAuthAuthenticator>,
        mapper: Arc<UserMapper>,
    ) -> Self {
        Self {
            clients,
            tokens,
            password,
            oauth,
            mapper,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn password_authenticator(&self) -> &Arc<PasswordAuthenticator> {
        &self.password
    }

    /// Handle an authorization request, returning the redirect target
    #[instrument(skip(self, request, principal), fields(client_id = %request.client_id))]
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        principal: Option<&UserInfo>,
    ) -> OAuthResult<String> {
        let client = self.clients.get(&request.client_id).await.map_err(client_error)?;

        let redirect = client
            .resolve_redirect_url(&request.redirect_uri)
            .map_err(|e| OAuthError::invalid_request(e.to_string()))?;
        let redirect = Url::parse(&redirect)
            .map_err(|e| OAuthError::invalid_request(format!("malformed redirect_uri: {}", e)))?;

        let Some(principal) = principal else {
            return Err(OAuthError::login_required());
        };

        if client.grant_method == GrantMethod::Deny {
            let err = OAuthError::new(OAuthErrorCode::AccessDenied, "client is not allowed to be granted");
            return Ok(redirect_with_error(redirect, &err, &request.state));
        }

        let scopes = granted_scopes(&client, &request.scope);
        debug!(scopes = ?scopes, "Granted scopes");

        let response_types: BTreeSet<&str> = request.response_type.split_whitespace().collect();
        if let Some(unknown) = response_types
            .iter()
            .find(|t| !SUPPORTED_RESPONSE_TYPES.contains(t))
        {
            let err = OAuthError::new(
                OAuthErrorCode::UnsupportedResponseType,
                format!("response type {:?} is not supported", unknown),
            );
            return Ok(redirect_with_error(redirect, &err, &request.state));
        }

        let nonce = Some(request.nonce.clone()).filter(|n| !n.is_empty());

        if response_types.contains("code") {
            let claims = Claims::new(TokenType::AuthorizationCode)
                .with_audience(client.name.clone())
                .with_nonce(nonce);
            let code = self
                .tokens
                .issue_to(
                    principal,
                    claims,
                    self.tokens.settings().authorization_code_max_age,
                )
                .await?;

            let mut redirect = redirect;
            {
                let mut query = redirect.query_pairs_mut();
                query.append_pair("code", &code);
                if !request.state.is_empty() {
                    query.append_pair("state", &request.state);
                }
            }
            info!(user = %principal.name, client = %client.name, "Authorization code issued");
            return Ok(redirect.into());
        }

        if response_types.contains("token") {
            let pair = self
                .tokens
                .issue_token_pair(principal, Some(&client), nonce)
                .await?;

            let mut fragment = form_urlencoded::Serializer::new(String::new());
            fragment
                .append_pair("access_token", &pair.access_token)
                .append_pair("token_type", &pair.token_type)
                .append_pair("expires_in", &pair.expires_in.to_string())
                .append_pair("refresh_token", &pair.refresh_token);
            if !request.state.is_empty() {
                fragment.append_pair("state", &request.state);
            }

            let mut redirect = redirect;
            redirect.set_fragment(Some(&fragment.finish()));
            info!(user = %principal.name, client = %client.name, "Implicit grant issued");
            return Ok(redirect.into());
        }

        let err = OAuthError::new(
            OAuthErrorCode::UnsupportedResponseType,
            "response_type must include code or token",
        );
        Ok(redirect_with_error(redirect, &err, &request.state))
    }

    /// Handle a token endpoint request
    #[instrument(skip(self, request, context), fields(grant_type = %request.grant_type, client_id = %request.client_id))]
    pub async fn token(&self, request: &TokenRequest, context: &LoginContext) -> OAuthResult<TokenPair> {
        let client = self.authenticate_client(&request.client_id, &request.client_secret).await?;

        match request.grant_type.as_str() {
            GRANT_TYPE_PASSWORD => self.password_grant(&client, request, context).await,
            GRANT_TYPE_REFRESH_TOKEN => self.refresh_token_grant(&client, &request.refresh_token).await,
            GRANT_TYPE_AUTHORIZATION_CODE => self.authorization_code_grant(&client, &request.code).await,
            other => Err(OAuthError::unsupported_grant_type(other)),
        }
    }

    async fn authenticate_client(&self, client_id: &str, client_secret: &str) -> OAuthResult<Client> {
        let client = self.clients.get(client_id).await.map_err(client_error)?;
        if !client.secret_matches(client_secret) {
            warn!(client_id = %client_id, "Client secret mismatch");
            return Err(OAuthError::invalid_client("client authentication failed"));
        }
        Ok(client)
    }

    async fn password_grant(
        &self,
        client: &Client,
        request: &TokenRequest,
        context: &LoginContext,
    ) -> OAuthResult<TokenPair> {
        let provider = Some(request.provider.as_str()).filter(|p| !p.is_empty());
        let principal = self
            .password
            .authenticate(
                &request.username,
                &request.password,
                provider,
                LoginType::Token,
                context,
            )
            .await
            .map_err(login_error)?;

        Ok(self
            .tokens
            .issue_token_pair(&principal, Some(client), None)
            .await?)
    }

    async fn refresh_token_grant(&self, client: &Client, refresh_token: &str) -> OAuthResult<TokenPair> {
        let claims = self
            .tokens
            .verify(refresh_token)
            .await
            .map_err(token_error)?;

        if claims.token_type != TokenType::Refresh {
            return Err(OAuthError::invalid_grant("the token is not a refresh token"));
        }
        if claims.aud.as_deref().is_some_and(|aud| aud != client.name) {
            return Err(OAuthError::invalid_grant("the refresh token was issued to another client"));
        }

        let principal = self.current_principal(&claims.principal()).await?;
        Ok(self
            .tokens
            .issue_token_pair(&principal, Some(client), claims.nonce)
            .await?)
    }

    /// Re-read the principal of a refresh token from the user store
    async fn current_principal(&self, principal: &UserInfo) -> OAuthResult<UserInfo> {
        if let Some(pre) = &principal.extra.pre_registration {
            // Registration may have completed since the token was issued
            return match self.mapper.find_mapped_user(&pre.provider, &pre.uid).await? {
                Some(user) if user.is_active() => Ok(UserInfo::from_user(&user)),
                Some(_) => Err(OAuthError::invalid_grant("the account is not active")),
                None => Err(OAuthError::invalid_grant("the user is not registered yet")),
            };
        }

        match self.mapper.find(&principal.name).await? {
            Some(user) if user.is_active() => Ok(UserInfo::from_user(&user)),
            Some(_) => Err(OAuthError::invalid_grant("the account is not active")),
            None => Err(OAuthError::invalid_grant("the user no longer exists")),
        }
    }

    async fn authorization_code_grant(&self, client: &Client, code: &str) -> OAuthResult<TokenPair> {
        let claims = self.tokens.verify(code).await.map_err(token_error)?;

        if claims.token_type != TokenType::AuthorizationCode {
            return Err(OAuthError::invalid_grant("the token is not an authorization code"));
        }
        if claims.aud.as_deref() != Some(client.name.as_str()) {
            return Err(OAuthError::invalid_grant("the authorization code was issued to another client"));
        }

        // Single use; the exchange proceeds if the cache refuses the delete
        if let Err(e) = self.tokens.revoke(code).await {
            warn!(client = %client.name, "Failed to revoke authorization code: {}", e);
        }

        let principal = claims.principal();
        let mut pair = self
            .tokens
            .issue_token_pair(&principal, Some(client), claims.nonce.clone())
            .await?;
        let audience = claims.aud.clone().unwrap_or_else(|| client.name.clone());
        pair.id_token = Some(
            self.tokens
                .issue_id_token(&principal, &audience, claims.nonce)
                .await?,
        );
        info!(user = %principal.name, client = %client.name, "Authorization code exchanged");
        Ok(pair)
    }

    /// Complete an identity provider redirect and issue tokens for the principal
    #[instrument(skip(self, request, context))]
    pub async fn callback(
        &self,
        provider: &str,
        request: &CallbackRequest,
        context: &LoginContext,
    ) -> OAuthResult<TokenPair> {
        let principal = self
            .oauth
            .authenticate(provider, request, context)
            .await
            .map_err(|e| OAuthError::new(OAuthErrorCode::AccessDenied, e.to_string()).with_status(401))?;

        Ok(self.tokens.issue_token_pair(&principal, None, None).await?)
    }

    /// Revoke every token of `principal`, then redirect if requested
    #[instrument(skip_all)]
    pub async fn logout(
        &self,
        principal: Option<&UserInfo>,
        request: &LogoutRequest,
    ) -> OAuthResult<LogoutOutcome> {
        match principal {
            // The pre-registration name is shared by every pending registration
            Some(p) if !p.is_pre_registration() => {
                self.tokens.revoke_all_user_tokens(&p.name).await?;
            }
            _ => debug!("Logout without a revocable principal"),
        }

        if request.post_logout_redirect_uri.is_empty() {
            return Ok(LogoutOutcome::Done);
        }

        let mut redirect = Url::parse(&request.post_logout_redirect_uri).map_err(|e| {
            OAuthError::invalid_request(format!("malformed post_logout_redirect_uri: {}", e))
        })?;
        if !request.state.is_empty() {
            redirect.query_pairs_mut().append_pair("state", &request.state);
        }
        Ok(LogoutOutcome::Redirect(redirect.into()))
    }

    /// Revoke a single token (RFC 7009)
    pub async fn revoke(&self, token: &str) -> OAuthResult<()> {
        if token.is_empty() {
            return Err(OAuthError::invalid_request("token is required"));
        }
        Ok(self.tokens.revoke(token).await?)
    }

    /// Answer a webhook token review
    pub async fn review(&self, review: TokenReview) -> TokenReview {
        let status = match self.tokens.principal_from_token(&review.spec.token).await {
            Ok(user) => TokenReviewStatus {
                authenticated: true,
                user: Some(user),
            },
            Err(e) => {
                debug!("Token review failed: {}", e);
                TokenReviewStatus::default()
            }
        };
        TokenReview {
            status: Some(status),
            ..review
        }
    }
}

impl std::fmt::Debug for AuthorizationServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationServer")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Requested scopes that are supported and, if the client restricts scopes,
/// allowed for the client
fn granted_scopes(client: &Client, requested: &str) -> Vec<String> {
    requested
        .split_whitespace()
        .filter(|scope| {
            if !SUPPORTED_SCOPES.contains(scope) {
                warn!(scope = %scope, "Ignoring unsupported scope");
                return false;
            }
            client.scope_restrictions.is_empty()
                || client.scope_restrictions.iter().any(|allowed| allowed == scope)
        })
        .map(str::to_string)
        .collect()
}

fn redirect_with_error(mut redirect: Url, err: &OAuthError, state: &str) -> String {
    {
        let mut query = redirect.query_pairs_mut();
        for (key, value) in err.redirect_params() {
            query.append_pair(key, &value);
        }
        if !state.is_empty() {
            query.append_pair("state", state);
        }
    }
    redirect.into()
}

fn client_error(e: WardenError) -> OAuthError {
    match e {
        WardenError::ClientNotFound { .. } => OAuthError::invalid_client(e.to_string()),
        other => other.into(),
    }
}

fn token_error(e: WardenError) -> OAuthError {
    match e {
        WardenError::TokenNotFound | WardenError::InvalidToken { .. } => {
            OAuthError::invalid_grant(e.to_string())
        }
        other => other.into(),
    }
}

fn login_error(e: WardenError) -> OAuthError {
    match e {
        WardenError::Cache { .. }
        | WardenError::Storage { .. }
        | WardenError::Internal { .. }
        | WardenError::Provider { .. } => e.into(),
        WardenError::RateLimitExceeded { .. } => {
            OAuthError::invalid_grant(e.to_string()).with_status(429)
        }
        other => OAuthError::invalid_grant(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(restrictions: &[&str]) -> Client {
        Client {
            name: "kubectl".to_string(),
            secret: "secret".to_string(),
            redirect_uris: vec!["https://foo/cb".to_string()],
            grant_method: GrantMethod::Auto,
            scope_restrictions: restrictions.iter().map(|s| s.to_string()).collect(),
            access_token_max_age: None,
            access_token_inactivity_timeout: None,
        }
    }

    #[test]
    fn test_unknown_scopes_are_dropped() {
        let scopes = granted_scopes(&client(&[]), "openid admin email");
        assert_eq!(scopes, vec!["openid", "email"]);
    }

    #[test]
    fn test_scope_restrictions_filter_scopes() {
        let scopes = granted_scopes(&client(&["openid"]), "openid email profile");
        assert_eq!(scopes, vec!["openid"]);
    }

    #[test]
    fn test_redirect_with_error_keeps_existing_query() {
        let url = Url::parse("https://foo/cb?tenant=a").unwrap();
        let err = OAuthError::new(OAuthErrorCode::AccessDenied, "denied");
        let redirect = redirect_with_error(url, &err, "xyz");
        assert_eq!(
            redirect,
            "https://foo/cb?tenant=a&error=access_denied&error_description=denied&state=xyz"
        );
    }

    #[test]
    fn test_token_errors_map_to_invalid_grant() {
        assert_eq!(token_error(WardenError::TokenNotFound).error, OAuthErrorCode::InvalidGrant);
        assert_eq!(
            token_error(WardenError::cache_error("down")).error,
            OAuthErrorCode::ServerError
        );
    }
}
