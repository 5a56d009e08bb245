//! Domain models for the Warden authentication core

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, WardenError};
use crate::ids::{LoginRecordId, UserUid};

// =============================================================================
// Labels
// =============================================================================

/// Label carried by persisted documents naming what they configure
pub const CONFIG_TYPE_LABEL: &str = "warden.io/config-type";
/// `CONFIG_TYPE_LABEL` value for identity provider configurations
pub const IDENTITY_PROVIDER_CONFIG_TYPE: &str = "identityprovider";
/// `CONFIG_TYPE_LABEL` value for OAuth clients
pub const OAUTH_CLIENT_CONFIG_TYPE: &str = "oauthclient";
/// Data key holding the YAML payload of a document
pub const PAYLOAD_KEY: &str = "configuration.yaml";

/// User label naming the identity provider a user was mirrored from
pub const IDENTITY_PROVIDER_LABEL: &str = "iam.warden.io/identity-provider";
/// User label holding the external user id at the origin provider
pub const ORIGIN_UID_LABEL: &str = "iam.warden.io/origin-uid";

// =============================================================================
// Users
// =============================================================================

/// Account state of a platform user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    #[default]
    Active,
    Disabled,
    /// Too many failed logins; set by the login limiter, cleared on expiry
    AuthLimitExceeded,
}

impl std::fmt::Display for UserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Disabled => write!(f, "disabled"),
            Self::AuthLimitExceeded => write!(f, "auth_limit_exceeded"),
        }
    }
}

/// Platform account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub uid: UserUid,
    #[serde(default)]
    pub email: String,
    /// Argon2id PHC string; absent for users mirrored from a provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_password: Option<String>,
    #[serde(default)]
    pub state: UserState,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Password was set by an administrator and must be changed on first login
    #[serde(default)]
    pub uninitialized: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_time: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: UserUid::new(),
            email: email.into(),
            encrypted_password: None,
            state: UserState::Active,
            labels: BTreeMap::new(),
            uninitialized: false,
            created_at: Utc::now(),
            last_login_time: None,
        }
    }

    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.encrypted_password = Some(hash.into());
        self
    }

    pub fn with_state(mut self, state: UserState) -> Self {
        self.state = state;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Provider this user was mirrored from, if any
    pub fn identity_provider(&self) -> Option<&str> {
        self.labels.get(IDENTITY_PROVIDER_LABEL).map(String::as_str)
    }

    pub fn origin_uid(&self) -> Option<&str> {
        self.labels.get(ORIGIN_UID_LABEL).map(String::as_str)
    }

    pub fn is_active(&self) -> bool {
        self.state == UserState::Active
    }
}

// =============================================================================
// Login records
// =============================================================================

/// How a login attempt was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginType {
    /// OAuth token endpoint (password grant)
    Token,
    /// Browser redirect through an OAuth identity provider
    OAuth,
    /// HTTP basic authentication
    BasicAuth,
}

/// Append-only audit record of a login attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRecord {
    pub id: LoginRecordId,
    pub username: String,
    pub login_type: LoginType,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub source_ip: String,
    #[serde(default)]
    pub user_agent: String,
    pub success: bool,
    #[serde(default)]
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Request-scoped data stored alongside a login record
#[derive(Debug, Clone, Default)]
pub struct LoginContext {
    pub provider: String,
    pub source_ip: String,
    pub user_agent: String,
}

impl LoginRecord {
    pub fn new(
        username: impl Into<String>,
        login_type: LoginType,
        context: &LoginContext,
        outcome: std::result::Result<(), &WardenError>,
    ) -> Self {
        let (success, reason) = match outcome {
            Ok(()) => (true, String::new()),
            Err(e) => (false, e.reason().to_string()),
        };
        Self {
            id: LoginRecordId::new(),
            username: username.into(),
            login_type,
            provider: context.provider.clone(),
            source_ip: context.source_ip.clone(),
            user_agent: context.user_agent.clone(),
            success,
            reason,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// OAuth clients
// =============================================================================

/// Redirect URI entry allowing any target
pub const WILDCARD_REDIRECT: &str = "*";

/// How an authorization request is granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantMethod {
    /// Grant without asking the user
    #[default]
    Auto,
    /// Ask the user to approve the grant
    Prompt,
    /// Never grant
    Deny,
}

/// OAuth client registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// The client_id
    pub name: String,
    pub secret: String,
    #[serde(rename = "redirectURIs", default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub grant_method: GrantMethod,
    #[serde(default)]
    pub scope_restrictions: Vec<String>,
    /// Access token lifetime override in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_max_age: Option<u64>,
    /// Inactivity window in seconds after which an access token is dropped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_inactivity_timeout: Option<u64>,
}

impl Client {
    /// Resolve the redirect target for an authorization request.
    ///
    /// An empty `expected` selects the first concrete registered URI. A
    /// non-empty one must be registered verbatim unless `*` is registered.
    pub fn resolve_redirect_url(&self, expected: &str) -> Result<String> {
        if self.redirect_uris.is_empty() {
            return Err(WardenError::redirect_not_allowed(expected));
        }

        if expected.is_empty() {
            return self
                .redirect_uris
                .iter()
                .find(|uri| uri.as_str() != WILDCARD_REDIRECT)
                .cloned()
                .ok_or_else(|| WardenError::redirect_not_allowed(expected));
        }

        if self
            .redirect_uris
            .iter()
            .any(|uri| uri == WILDCARD_REDIRECT || uri == expected)
        {
            return Ok(expected.to_string());
        }

        Err(WardenError::redirect_not_allowed(expected))
    }

    /// Constant-time secret comparison
    pub fn secret_matches(&self, secret: &str) -> bool {
        constant_time_eq(self.secret.as_bytes(), secret.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// =============================================================================
// Persisted documents
// =============================================================================

/// Labeled secret-like document holding a YAML payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Document {
    /// Build a document of `config_type` with `value` encoded as its payload
    pub fn from_payload<T: Serialize>(
        name: impl Into<String>,
        config_type: &str,
        value: &T,
    ) -> Result<Self> {
        let payload = serde_yaml::to_string(value)
            .map_err(|e| WardenError::invalid_input(format!("Failed to encode payload: {}", e)))?;
        let mut labels = BTreeMap::new();
        labels.insert(CONFIG_TYPE_LABEL.to_string(), config_type.to_string());
        let mut data = BTreeMap::new();
        data.insert(PAYLOAD_KEY.to_string(), payload);
        Ok(Self {
            name: name.into(),
            labels,
            data,
        })
    }

    pub fn config_type(&self) -> Option<&str> {
        self.labels.get(CONFIG_TYPE_LABEL).map(String::as_str)
    }

    /// Decode the YAML payload
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = self.data.get(PAYLOAD_KEY).ok_or_else(|| {
            WardenError::invalid_input(format!(
                "Document {} has no {} payload",
                self.name, PAYLOAD_KEY
            ))
        })?;
        serde_yaml::from_str(payload).map_err(|e| {
            WardenError::invalid_input(format!("Malformed document {}: {}", self.name, e))
        })
    }
}

/// Label selector with equality requirements only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn config_type(config_type: &str) -> Self {
        let mut match_labels = BTreeMap::new();
        match_labels.insert(CONFIG_TYPE_LABEL.to_string(), config_type.to_string());
        Self { match_labels }
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}
