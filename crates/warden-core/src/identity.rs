//! Identity provider abstractions
//!
//! Providers come in exactly two shapes:
//! - `OAuthProvider`: driven by a browser redirect back from the provider
//! - `GenericProvider`: driven by directly presented credentials (e.g. LDAP bind)
//!
//! Each configured provider is built once by its `ProviderFactory` into an
//! `IdentityProvider`, which is the only place the two shapes are told apart.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, WardenError};

// =============================================================================
// Identities and configurations
// =============================================================================

/// Identity asserted by an external provider, not yet linked to a local user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id at the provider
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            email: email.into(),
        }
    }
}

/// How an external identity is linked to a local user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingMethod {
    /// Create the local user on first login
    #[default]
    Auto,
    /// Only accept identities already mapped to a local user
    Lookup,
    /// Defer account creation to the user (pre-registration)
    Manual,
    /// Not handled by the login path
    Mixed,
}

impl std::fmt::Display for MappingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Lookup => write!(f, "lookup"),
            Self::Manual => write!(f, "manual"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

/// Opaque provider options document, decoded by the provider factory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderOptions(pub serde_yaml::Mapping);

impl ProviderOptions {
    /// Decode into the factory's options struct
    pub fn decode<T: DeserializeOwned>(&self, provider_type: &str) -> Result<T> {
        serde_yaml::from_value(serde_yaml::Value::Mapping(self.0.clone()))
            .map_err(|e| WardenError::invalid_options(provider_type, e.to_string()))
    }

    pub fn insert(&mut self, key: &str, value: impl Into<serde_yaml::Value>) {
        self.0
            .insert(serde_yaml::Value::String(key.to_string()), value.into());
    }
}

/// Named identity provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub mapping_method: MappingMethod,
    #[serde(default)]
    pub provider: ProviderOptions,
}

// =============================================================================
// Principals
// =============================================================================

/// Name of the transient principal carried while account creation is deferred
pub const PRE_REGISTRATION_USER: &str = "system:pre-registration";

/// Unverified external claims carried by the pre-registration principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreRegistration {
    pub provider: String,
    pub uid: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// Extra claims attached to a principal and carried in tokens
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraClaims {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub uninitialized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_registration: Option<PreRegistration>,
}

impl ExtraClaims {
    pub fn is_empty(&self) -> bool {
        !self.uninitialized && self.pre_registration.is_none()
    }
}

/// Authenticated principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "ExtraClaims::is_empty")]
    pub extra: ExtraClaims,
}

impl UserInfo {
    pub fn from_user(user: &crate::models::User) -> Self {
        Self {
            name: user.name.clone(),
            uid: user.uid.to_string(),
            email: user.email.clone(),
            groups: vec![],
            extra: ExtraClaims {
                uninitialized: user.uninitialized,
                pre_registration: None,
            },
        }
    }

    /// Transient principal for an identity whose account creation is deferred
    pub fn pre_registration(provider: &str, identity: &Identity) -> Self {
        Self {
            name: PRE_REGISTRATION_USER.to_string(),
            uid: String::new(),
            email: identity.email.clone(),
            groups: vec![],
            extra: ExtraClaims {
                uninitialized: false,
                pre_registration: Some(PreRegistration {
                    provider: provider.to_string(),
                    uid: identity.user_id.clone(),
                    username: identity.username.clone(),
                    email: identity.email.clone(),
                }),
            },
        }
    }

    pub fn is_pre_registration(&self) -> bool {
        self.name == PRE_REGISTRATION_USER
    }
}

// =============================================================================
// Provider traits
// =============================================================================

/// Browser redirect parameters delivered to the callback endpoint
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    pub query: HashMap<String, String>,
}

impl CallbackRequest {
    pub fn new(query: HashMap<String, String>) -> Self {
        Self { query }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Provider authenticating through a browser redirect
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Exchange the redirect parameters for the asserted identity
    async fn identity_exchange_callback(&self, request: &CallbackRequest) -> Result<Identity>;
}

/// Provider authenticating directly presented credentials
///
/// Rejected credentials are reported as `WardenError::Unauthorized`.
#[async_trait]
pub trait GenericProvider: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Identity>;
}

/// A constructed identity provider
#[derive(Clone)]
pub enum IdentityProvider {
    OAuth(Arc<dyn OAuthProvider>),
    Generic(Arc<dyn GenericProvider>),
}

impl IdentityProvider {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OAuth(_) => "oauth",
            Self::Generic(_) => "generic",
        }
    }

    pub fn as_oauth(&self) -> Option<&Arc<dyn OAuthProvider>> {
        match self {
            Self::OAuth(p) => Some(p),
            Self::Generic(_) => None,
        }
    }

    pub fn as_generic(&self) -> Option<&Arc<dyn GenericProvider>> {
        match self {
            Self::Generic(p) => Some(p),
            Self::OAuth(_) => None,
        }
    }
}

impl std::fmt::Debug for IdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IdentityProvider").field(&self.kind()).finish()
    }
}

/// Builds providers of one type from their options document
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Unique type string matched against `Configuration::provider_type`
    fn provider_type(&self) -> &'static str;

    /// Decode and validate `options`, then build an immutable provider
    async fn create(&self, options: &ProviderOptions) -> Result<IdentityProvider>;
}
