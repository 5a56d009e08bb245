//! CAS identity provider
//!
//! Validates the service ticket delivered to the callback against the CAS
//! server's `p3/serviceValidate` endpoint using its JSON response format.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use warden_core::{
    CallbackRequest, Identity, IdentityProvider, OAuthProvider, ProviderFactory, ProviderOptions,
    Result, WardenError,
};

use super::common::*;

pub const CAS_PROVIDER_TYPE: &str = "CASIdentityProvider";

/// Options document of a `CASIdentityProvider` configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasOptions {
    /// CAS server base URL, e.g. `https://cas.example.com/cas`
    pub server_url: String,
    /// Service URL the ticket was issued for
    pub service_url: String,
    /// Attribute holding the user id; the CAS user name when absent
    #[serde(default)]
    pub user_id_attribute: Option<String>,
    #[serde(default = "default_email_attribute")]
    pub email_attribute: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_email_attribute() -> String {
    "mail".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    service_response: ServiceResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceResponse {
    authentication_success: Option<AuthenticationSuccess>,
    authentication_failure: Option<AuthenticationFailure>,
}

#[derive(Debug, Deserialize)]
struct AuthenticationSuccess {
    user: String,
    #[serde(default)]
    attributes: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AuthenticationFailure {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

/// CAS attributes arrive either as scalars or as single-element arrays
fn first_attribute(attributes: &HashMap<String, serde_json::Value>, key: &str) -> Option<String> {
    match attributes.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(values) => values.first().and_then(|v| v.as_str()).map(String::from),
        _ => None,
    }
}

pub struct CasProvider {
    options: CasOptions,
    validate_url: url::Url,
    http_client: HttpClient,
}

impl CasProvider {
    pub fn new(options: CasOptions) -> Result<Self> {
        let server = parse_endpoint(CAS_PROVIDER_TYPE, "serverUrl", &options.server_url)?;
        parse_endpoint(CAS_PROVIDER_TYPE, "serviceUrl", &options.service_url)?;

        let validate_url = url::Url::parse(&format!(
            "{}/p3/serviceValidate",
            server.as_str().trim_end_matches('/')
        ))
        .map_err(|e| WardenError::invalid_options(CAS_PROVIDER_TYPE, e.to_string()))?;

        let http_client = HttpClient::new(
            CAS_PROVIDER_TYPE,
            Duration::from_secs(options.timeout_secs),
        )?;

        Ok(Self {
            options,
            validate_url,
            http_client,
        })
    }
}

#[async_trait]
impl OAuthProvider for CasProvider {
    #[instrument(skip(self, request))]
    async fn identity_exchange_callback(&self, request: &CallbackRequest) -> Result<Identity> {
        let ticket = request
            .param("ticket")
            .ok_or_else(|| WardenError::invalid_input("Callback is missing the ticket parameter"))?;

        let response: ValidateResponse = self
            .http_client
            .send_json(self.http_client.inner().get(self.validate_url.clone()).query(&[
                ("service", self.options.service_url.as_str()),
                ("ticket", ticket),
                ("format", "JSON"),
            ]))
            .await?;

        let response = response.service_response;
        if let Some(failure) = response.authentication_failure {
            warn!(code = %failure.code, "CAS ticket validation failed");
            return Err(WardenError::provider(
                CAS_PROVIDER_TYPE,
                format!("{}: {}", failure.code, failure.description.trim()),
            ));
        }

        let success = response.authentication_success.ok_or_else(|| {
            WardenError::provider(CAS_PROVIDER_TYPE, "Empty ticket validation response")
        })?;

        let user_id = self
            .options
            .user_id_attribute
            .as_deref()
            .and_then(|key| first_attribute(&success.attributes, key))
            .unwrap_or_else(|| success.user.clone());
        let email =
            first_attribute(&success.attributes, &self.options.email_attribute).unwrap_or_default();

        debug!(user = %success.user, "Validated CAS ticket");
        Ok(Identity::new(user_id, success.user, email))
    }
}

/// Factory for `CASIdentityProvider` configurations
#[derive(Debug, Default)]
pub struct CasProviderFactory;

#[async_trait]
impl ProviderFactory for CasProviderFactory {
    fn provider_type(&self) -> &'static str {
        CAS_PROVIDER_TYPE
    }

    async fn create(&self, options: &ProviderOptions) -> Result<IdentityProvider> {
        let options: CasOptions = options.decode(CAS_PROVIDER_TYPE)?;
        Ok(IdentityProvider::OAuth(Arc::new(CasProvider::new(options)?)))
    }
}
