//! Error types for the Warden authentication core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Identity provider not found: {name}")]
    ProviderNotFound { name: String },

    #[error("Identity provider configuration not found: {name}")]
    ConfigurationNotFound { name: String },

    #[error("OAuth client not found: {name}")]
    ClientNotFound { name: String },

    #[error("Redirect URL is not allowed: {url}")]
    RedirectUrlNotAllowed { url: String },

    #[error("Incorrect username or password")]
    IncorrectPassword,

    #[error("Too many failed login attempts for user {username}")]
    RateLimitExceeded { username: String },

    #[error("Account {username} is not active")]
    AccountIsNotActive { username: String },

    #[error("Invalid mapping method: {method}")]
    InvalidMappingMethod { method: String },

    #[error("User not found: {name}")]
    UserNotFound { name: String },

    #[error("Unsupported identity provider type: {provider_type}")]
    UnsupportedProviderType { provider_type: String },

    #[error("Invalid options for identity provider {provider_type}: {message}")]
    InvalidProviderOptions {
        provider_type: String,
        message: String,
    },

    #[error("Identity provider {provider} rejected the credentials")]
    Unauthorized { provider: String },

    #[error("Identity provider {provider} error: {message}")]
    Provider { provider: String, message: String },

    #[error("Identity provider {provider} did not answer in time")]
    ProviderTimeout { provider: String },

    #[error("Token not found in cache, it may have been revoked or expired")]
    TokenNotFound,

    #[error("Invalid token: {message}")]
    InvalidToken { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WardenError {
    pub fn provider_not_found(name: impl Into<String>) -> Self {
        Self::ProviderNotFound { name: name.into() }
    }

    pub fn configuration_not_found(name: impl Into<String>) -> Self {
        Self::ConfigurationNotFound { name: name.into() }
    }

    pub fn client_not_found(name: impl Into<String>) -> Self {
        Self::ClientNotFound { name: name.into() }
    }

    pub fn redirect_not_allowed(url: impl Into<String>) -> Self {
        Self::RedirectUrlNotAllowed { url: url.into() }
    }

    pub fn invalid_options(provider_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidProviderOptions {
            provider_type: provider_type.into(),
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn provider_timeout(provider: impl Into<String>) -> Self {
        Self::ProviderTimeout {
            provider: provider.into(),
        }
    }

    pub fn unauthorized(provider: impl Into<String>) -> Self {
        Self::Unauthorized {
            provider: provider.into(),
        }
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn cache_error(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn storage_error(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Short machine-readable reason, stored on login records
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ProviderNotFound { .. } => "ProviderNotFound",
            Self::ConfigurationNotFound { .. } => "ConfigurationNotFound",
            Self::ClientNotFound { .. } => "ClientNotFound",
            Self::RedirectUrlNotAllowed { .. } => "RedirectURLNotAllowed",
            Self::IncorrectPassword | Self::Unauthorized { .. } => "IncorrectPassword",
            Self::RateLimitExceeded { .. } => "RateLimitExceeded",
            Self::AccountIsNotActive { .. } => "AccountIsNotActive",
            Self::InvalidMappingMethod { .. } => "InvalidMappingMethod",
            Self::UserNotFound { .. } => "UserNotFound",
            Self::UnsupportedProviderType { .. } => "UnsupportedProviderType",
            Self::InvalidProviderOptions { .. } => "InvalidProviderOptions",
            Self::Provider { .. } => "ProviderError",
            Self::ProviderTimeout { .. } => "ProviderTimeout",
            Self::TokenNotFound => "TokenNotFound",
            Self::InvalidToken { .. } => "InvalidToken",
            Self::InvalidInput { .. } => "InvalidInput",
            Self::Cache { .. } => "CacheError",
            Self::Storage { .. } => "StorageError",
            Self::Config { .. } => "ConfigError",
            Self::Internal { .. } => "InternalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
