//! Token issuance, verification and revocation over the token cache

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use warden_core::{Client, Result, TokenCache, TokenId, UserInfo, WardenError};

use crate::jwt::{Claims, TokenCodec, TokenType};

pub const DEFAULT_ACCESS_TOKEN_MAX_AGE: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_REFRESH_TOKEN_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_AUTHORIZATION_CODE_MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// Token lifetimes
#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// Zero issues non-expiring access tokens and disables the cache check
    pub access_token_max_age: Duration,
    pub refresh_token_max_age: Duration,
    pub authorization_code_max_age: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_token_max_age: DEFAULT_ACCESS_TOKEN_MAX_AGE,
            refresh_token_max_age: DEFAULT_REFRESH_TOKEN_MAX_AGE,
            authorization_code_max_age: DEFAULT_AUTHORIZATION_CODE_MAX_AGE,
        }
    }
}

/// Token endpoint response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub token_type: String,
    /// Zero for access tokens that never expire
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

fn cache_key(username: &str, token: &str) -> String {
    format!("user:{}:token:{}", username, token)
}

/// Pattern for every cache entry of `token`, whoever it was issued to
fn token_pattern(token: &str) -> String {
    format!("user:*:token:{}", globset::escape(token))
}

/// Pattern for every cache entry issued to `username`
fn user_pattern(username: &str) -> String {
    format!("user:{}:token:*", globset::escape(username))
}

/// Issues, verifies and revokes bearer tokens
///
/// A token issued with a lifetime is only valid while its cache entry
/// `user:<name>:token:<token>` exists.
pub struct TokenManager {
    codec: TokenCodec,
    cache: Arc<dyn TokenCache>,
    settings: TokenSettings,
}

impl TokenManager {
    pub fn new(codec: TokenCodec, cache: Arc<dyn TokenCache>, settings: TokenSettings) -> Self {
        Self {
            codec,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Tokens carry no cache entry and are checked by signature and expiry only
    pub fn is_stateless(&self) -> bool {
        self.settings.access_token_max_age.is_zero()
    }

    /// Sign `claims` for `user`; a non-zero `expires_in` also caches the token
    pub async fn issue_to(&self, user: &UserInfo, claims: Claims, expires_in: Duration) -> Result<String> {
        self.issue_with_inactivity(user, claims, expires_in, None)
            .await
    }

    /// Like `issue_to`, but the cache entry expires after `inactivity` unless
    /// refreshed by `verify`
    #[instrument(skip(self, user, claims), fields(user = %user.name, token_type = %claims.token_type))]
    pub async fn issue_with_inactivity(
        &self,
        user: &UserInfo,
        mut claims: Claims,
        expires_in: Duration,
        inactivity: Option<Duration>,
    ) -> Result<String> {
        let now = Utc::now().timestamp();
        claims.sub = user.name.clone();
        claims.extra = user.extra.clone();
        claims.iss = self.codec.issuer().to_string();
        claims.iat = now;
        claims.jti = TokenId::new().to_string();
        claims.exp = (!expires_in.is_zero()).then(|| now + expires_in.as_secs() as i64);

        let token = self.codec.encode(&claims)?;

        if expires_in.is_zero() || claims.token_type == TokenType::Static {
            return Ok(token);
        }

        let inactivity = inactivity.filter(|d| !d.is_zero());
        let ttl = inactivity.map_or(expires_in, |d| d.min(expires_in));
        let window = inactivity.map_or(0, |d| d.as_secs());
        self.cache
            .set(&cache_key(&user.name, &token), &window.to_string(), ttl)
            .await?;

        debug!(ttl_secs = ttl.as_secs(), "Token issued");
        Ok(token)
    }

    /// Decode and validate `token`, requiring its cache entry unless the
    /// token is static or the manager is stateless
    pub async fn verify(&self, token: &str) -> Result<Claims> {
        let claims = self.codec.decode(token)?;

        if self.is_stateless() || claims.token_type == TokenType::Static {
            return Ok(claims);
        }

        let key = cache_key(&claims.sub, token);
        let Some(window) = self.cache.get(&key).await? else {
            return Err(WardenError::TokenNotFound);
        };

        // Slide the inactivity window, never past the token's own expiry
        let window = window.parse::<u64>().unwrap_or(0);
        if window > 0 {
            let mut ttl = window;
            if let Some(remaining) = claims.remaining_secs() {
                ttl = ttl.min(remaining.max(1) as u64);
            }
            self.cache
                .set(&key, &window.to_string(), Duration::from_secs(ttl))
                .await?;
        }

        Ok(claims)
    }

    /// Remove `token` from the cache; revoking an unknown token is not an error
    #[instrument(skip_all)]
    pub async fn revoke(&self, token: &str) -> Result<()> {
        let keys = self.cache.keys(&token_pattern(token)).await?;
        if !keys.is_empty() {
            self.cache.del(&keys).await?;
            debug!("Revoked {} token entries", keys.len());
        }
        Ok(())
    }

    /// Remove every cached token of `username`
    #[instrument(skip(self))]
    pub async fn revoke_all_user_tokens(&self, username: &str) -> Result<()> {
        let keys = self.cache.keys(&user_pattern(username)).await?;
        if !keys.is_empty() {
            self.cache.del(&keys).await?;
        }
        info!("Revoked {} tokens of user {}", keys.len(), username);
        Ok(())
    }

    /// Issue an access and a refresh token, applying `client` lifetime overrides
    pub async fn issue_token_pair(
        &self,
        user: &UserInfo,
        client: Option<&Client>,
        nonce: Option<String>,
    ) -> Result<TokenPair> {
        // A zero override falls back to the server default
        let access_max_age = client
            .and_then(|c| c.access_token_max_age)
            .filter(|secs| *secs > 0)
            .map_or(self.settings.access_token_max_age, Duration::from_secs);
        let inactivity = client
            .and_then(|c| c.access_token_inactivity_timeout)
            .map(Duration::from_secs);

        let mut access_claims = Claims::new(TokenType::Access).with_nonce(nonce.clone());
        let mut refresh_claims = Claims::new(TokenType::Refresh).with_nonce(nonce);
        if let Some(client) = client {
            access_claims = access_claims.with_audience(client.name.clone());
            refresh_claims = refresh_claims.with_audience(client.name.clone());
        }

        let access_token = self
            .issue_with_inactivity(user, access_claims, access_max_age, inactivity)
            .await?;
        // A refresh token never expires before the access token it renews
        let refresh_max_age = self.settings.refresh_token_max_age.max(access_max_age);
        let refresh_token = self.issue_to(user, refresh_claims, refresh_max_age).await?;

        Ok(TokenPair {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: access_max_age.as_secs(),
            refresh_token,
            id_token: None,
        })
    }

    /// Issue an OIDC ID token for `audience`
    pub async fn issue_id_token(
        &self,
        user: &UserInfo,
        audience: &str,
        nonce: Option<String>,
    ) -> Result<String> {
        let claims = Claims::new(TokenType::IdToken)
            .with_audience(audience)
            .with_nonce(nonce);
        self.issue_to(user, claims, self.settings.access_token_max_age)
            .await
    }

    /// Principal of a bearer token; only access and static tokens authenticate
    pub async fn principal_from_token(&self, token: &str) -> Result<UserInfo> {
        let claims = self.verify(token).await?;
        match claims.token_type {
            TokenType::Access | TokenType::Static => Ok(claims.principal()),
            other => Err(WardenError::invalid_token(format!(
                "{} tokens cannot be used as bearer tokens",
                other
            ))),
        }
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("codec", &self.codec)
            .field("settings", &self.settings)
            .finish()
    }
}
