//! Generic OIDC identity provider
//!
//! Completes the authorization code flow: the callback `code` is exchanged at
//! the token endpoint and the identity is read from the userinfo endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use warden_core::{
    CallbackRequest, Identity, IdentityProvider, OAuthProvider, ProviderFactory, ProviderOptions,
    Result, WardenError,
};

use super::common::*;

pub const OIDC_PROVIDER_TYPE: &str = "OIDCIdentityProvider";

/// Claim names the identity is read from
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClaimMappings {
    pub user_id: String,
    pub username: String,
    pub email: String,
}

impl Default for ClaimMappings {
    fn default() -> Self {
        Self {
            user_id: "sub".to_string(),
            username: "preferred_username".to_string(),
            email: "email".to_string(),
        }
    }
}

/// Options document of an `OIDCIdentityProvider` configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcOptions {
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    /// Callback URL registered at the provider
    pub redirect_url: String,
    #[serde(default)]
    pub claims: ClaimMappings,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl OidcOptions {
    fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(WardenError::invalid_options(
                OIDC_PROVIDER_TYPE,
                "clientId must not be empty",
            ));
        }
        parse_endpoint(OIDC_PROVIDER_TYPE, "tokenEndpoint", &self.token_endpoint)?;
        parse_endpoint(OIDC_PROVIDER_TYPE, "userinfoEndpoint", &self.userinfo_endpoint)?;
        parse_endpoint(OIDC_PROVIDER_TYPE, "redirectUrl", &self.redirect_url)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct OidcProvider {
    options: OidcOptions,
    http_client: HttpClient,
}

impl OidcProvider {
    pub fn new(options: OidcOptions) -> Result<Self> {
        options.validate()?;
        let http_client = HttpClient::new(
            OIDC_PROVIDER_TYPE,
            Duration::from_secs(options.timeout_secs),
        )?;
        Ok(Self {
            options,
            http_client,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<String> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.options.redirect_url.as_str()),
            ("client_id", self.options.client_id.as_str()),
            ("client_secret", self.options.client_secret.as_str()),
        ];

        let response: TokenResponse = self
            .http_client
            .send_json(
                self.http_client
                    .inner()
                    .post(&self.options.token_endpoint)
                    .form(&params),
            )
            .await?;
        Ok(response.access_token)
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<serde_json::Value> {
        self.http_client
            .send_json(
                self.http_client
                    .inner()
                    .get(&self.options.userinfo_endpoint)
                    .bearer_auth(access_token),
            )
            .await
    }

    fn identity_from_claims(&self, claims: &serde_json::Value) -> Result<Identity> {
        let mappings = &self.options.claims;
        let user_id = string_claim(claims, &mappings.user_id).ok_or_else(|| {
            WardenError::provider(
                OIDC_PROVIDER_TYPE,
                format!("Userinfo is missing the {} claim", mappings.user_id),
            )
        })?;
        let email = string_claim(claims, &mappings.email).unwrap_or_default();
        let username = string_claim(claims, &mappings.username)
            .or_else(|| email.split('@').next().filter(|s| !s.is_empty()).map(String::from))
            .unwrap_or_else(|| user_id.clone());

        Ok(Identity::new(user_id, username, email))
    }
}

#[async_trait]
impl OAuthProvider for OidcProvider {
    #[instrument(skip(self, request))]
    async fn identity_exchange_callback(&self, request: &CallbackRequest) -> Result<Identity> {
        if let Some(error) = request.param("error") {
            let description = request.param("error_description").unwrap_or(error);
            return Err(WardenError::provider(OIDC_PROVIDER_TYPE, description));
        }

        let code = request
            .param("code")
            .ok_or_else(|| WardenError::invalid_input("Callback is missing the code parameter"))?;

        let access_token = self.exchange_code(code).await?;
        let claims = self.fetch_userinfo(&access_token).await?;
        let identity = self.identity_from_claims(&claims)?;
        debug!(user_id = %identity.user_id, "Resolved OIDC identity");
        Ok(identity)
    }
}

/// Factory for `OIDCIdentityProvider` configurations
#[derive(Debug, Default)]
pub struct OidcProviderFactory;

#[async_trait]
impl ProviderFactory for OidcProviderFactory {
    fn provider_type(&self) -> &'static str {
        OIDC_PROVIDER_TYPE
    }

    async fn create(&self, options: &ProviderOptions) -> Result<IdentityProvider> {
        let options: OidcOptions = options.decode(OIDC_PROVIDER_TYPE)?;
        Ok(IdentityProvider::OAuth(Arc::new(OidcProvider::new(options)?)))
    }
}
