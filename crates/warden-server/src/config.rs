//! Server configuration

use anyhow::{ensure, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use warden_oauth::TokenSettings;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub authentication: AuthenticationSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct JwtSettings {
    pub secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Zero issues non-expiring access tokens checked by signature only
    #[serde(default = "default_access_token_max_age")]
    pub access_token_max_age_secs: u64,
    #[serde(default = "default_refresh_token_max_age")]
    pub refresh_token_max_age_secs: u64,
    #[serde(default = "default_authorization_code_max_age")]
    pub authorization_code_max_age_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct AuthenticationSettings {
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CacheSettings {
    /// In-memory cache when unset
    pub redis_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BootstrapSettings {
    /// YAML file of users, identity providers and clients to seed
    pub path: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9090
}

fn default_issuer() -> String {
    "warden".to_string()
}

fn default_access_token_max_age() -> u64 {
    7200
}

fn default_refresh_token_max_age() -> u64 {
    86400
}

fn default_authorization_code_max_age() -> u64 {
    600
}

fn default_provider_timeout() -> u64 {
    15
}

impl Default for AuthenticationSettings {
    fn default() -> Self {
        Self {
            provider_timeout_secs: default_provider_timeout(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_builder(
            config::Config::builder()
                .add_source(config::File::with_name("config/default").required(false))
                .add_source(config::File::with_name("config/local").required(false))
                // Environment variables with WARDEN_ prefix, e.g. WARDEN__JWT__SECRET
                .add_source(
                    config::Environment::with_prefix("WARDEN")
                        .prefix_separator("__")
                        .separator("__")
                        .try_parsing(true),
                ),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let settings: Self = builder
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("jwt.issuer", default_issuer())?
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.jwt.secret.is_empty(), "jwt.secret must be set");
        ensure!(
            self.jwt.authorization_code_max_age_secs > 0,
            "jwt.authorization_code_max_age_secs must be positive"
        );
        Ok(())
    }

    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            access_token_max_age: Duration::from_secs(self.jwt.access_token_max_age_secs),
            refresh_token_max_age: Duration::from_secs(self.jwt.refresh_token_max_age_secs),
            authorization_code_max_age: Duration::from_secs(
                self.jwt.authorization_code_max_age_secs,
            ),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.authentication.provider_timeout_secs)
    }
}
