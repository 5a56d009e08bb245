//! HTTP plumbing shared by redirect-based providers

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use warden_core::{Result, WardenError};

/// Default timeout for a single outbound provider request
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// reqwest client bound to one provider, mapping failures to provider errors
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    provider: String,
}

impl HttpClient {
    pub fn new(provider: impl Into<String>, timeout: Duration) -> Result<Self> {
        let provider = provider.into();
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            WardenError::internal_error(format!("Failed to create HTTP client: {}", e))
        })?;
        Ok(Self { client, provider })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Send a request and decode a JSON body from a successful response
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        response.json().await.map_err(|e| {
            WardenError::provider(&self.provider, format!("Malformed response: {}", e))
        })
    }

    /// Send a request, failing on any non-success status
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| WardenError::provider(&self.provider, format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(provider = %self.provider, %status, "Provider returned an error status");
        Err(WardenError::provider(
            &self.provider,
            format!("HTTP {} - {}", status, body),
        ))
    }
}

/// Read a string claim from a JSON object by key
pub fn string_claim(claims: &serde_json::Value, key: &str) -> Option<String> {
    match claims.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Validate that an endpoint option is an absolute http(s) URL
pub fn parse_endpoint(provider_type: &str, key: &str, value: &str) -> Result<url::Url> {
    let url = url::Url::parse(value).map_err(|e| {
        WardenError::invalid_options(provider_type, format!("{} is not a valid URL: {}", key, e))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(WardenError::invalid_options(
            provider_type,
            format!("{} has unsupported scheme {}", key, other),
        )),
    }
}

pub fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
