//! Password and OAuth authenticators
//!
//! Both orchestrate provider lookup, the provider call, user mapping and
//! login recording. Every attempt produces exactly one login record.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use warden_core::{
    CallbackRequest, Identity, LoginContext, LoginRecord, LoginRecorder, LoginType, Result, User,
    UserInfo, UserState, WardenError,
};

use crate::mapper::UserMapper;
use crate::password::{hash_password_async, needs_rehash, verify_password_async};
use crate::registry::ProviderRegistry;

/// Default deadline for a single identity provider call
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

/// Provider name recorded for logins against local passwords
pub const LOCAL_PROVIDER: &str = "local";

// =============================================================================
// Login recording
// =============================================================================

/// Best-effort writer of login records
#[derive(Clone)]
pub struct LoginAudit {
    recorder: Arc<dyn LoginRecorder>,
}

impl LoginAudit {
    pub fn new(recorder: Arc<dyn LoginRecorder>) -> Self {
        Self { recorder }
    }

    /// Record an attempt; recorder failures are logged, never returned
    pub async fn record(
        &self,
        username: &str,
        login_type: LoginType,
        context: &LoginContext,
        outcome: std::result::Result<(), &WardenError>,
    ) {
        let record = LoginRecord::new(username, login_type, context, outcome);
        if let Err(e) = self.recorder.record(&record).await {
            warn!(username, "Failed to record login attempt: {}", e);
        }
    }
}

/// Bound a provider call by `deadline`; expiry is an ordinary failure
async fn with_deadline<T>(
    provider: &str,
    deadline: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| WardenError::provider_timeout(provider))?
}

/// Store a fresh hash for a verified password; failures are only logged
async fn upgrade_password_hash(mapper: &UserMapper, user: &User, password: &str) {
    let hash = match hash_password_async(password.to_string()).await {
        Ok(hash) => hash,
        Err(e) => {
            warn!(user = %user.name, "Failed to re-hash password: {}", e);
            return;
        }
    };
    let mut user = user.clone();
    user.encrypted_password = Some(hash);
    match mapper.users().update(&user).await {
        Ok(_) => debug!(user = %user.name, "Upgraded stored password hash"),
        Err(e) => warn!(user = %user.name, "Failed to store upgraded password hash: {}", e),
    }
}

/// Set the last login time of a mapped user; failures are only logged
async fn touch_last_login(mapper: &UserMapper, principal: &UserInfo) {
    if principal.is_pre_registration() {
        return;
    }
    let users = mapper.users();
    match users.get(&principal.name).await {
        Ok(Some(mut user)) => {
            user.last_login_time = Some(Utc::now());
            if let Err(e) = users.update(&user).await {
                warn!(user = %principal.name, "Failed to update last login time: {}", e);
            }
        }
        Ok(None) => {}
        Err(e) => warn!(user = %principal.name, "Failed to load user: {}", e),
    }
}

// =============================================================================
// Password authenticator
// =============================================================================

pub struct PasswordAuthenticator {
    registry: Arc<ProviderRegistry>,
    mapper: Arc<UserMapper>,
    audit: LoginAudit,
    provider_timeout: Duration,
}

impl PasswordAuthenticator {
    pub fn new(registry: Arc<ProviderRegistry>, mapper: Arc<UserMapper>, audit: LoginAudit) -> Self {
        Self {
            registry,
            mapper,
            audit,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Authenticate a username and password, locally or through `provider`,
    /// and record the attempt
    #[instrument(skip(self, password, context))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        provider: Option<&str>,
        login_type: LoginType,
        context: &LoginContext,
    ) -> Result<UserInfo> {
        let provider_name = provider.filter(|p| !p.is_empty());

        let result = match provider_name {
            Some(name) => self.authenticate_with_provider(name, username, password).await,
            None => self.authenticate_local(username, password).await,
        };

        let mut context = context.clone();
        context.provider = provider_name.unwrap_or(LOCAL_PROVIDER).to_string();
        match &result {
            Ok(principal) => {
                self.audit
                    .record(&principal.name, login_type, &context, Ok(()))
                    .await;
                touch_last_login(&self.mapper, principal).await;
            }
            Err(e) => {
                debug!("Password login failed: {}", e);
                self.audit
                    .record(username, login_type, &context, Err(e))
                    .await;
            }
        }
        result
    }

    async fn authenticate_local(&self, username: &str, password: &str) -> Result<UserInfo> {
        if username.is_empty() || password.is_empty() {
            return Err(WardenError::IncorrectPassword);
        }

        let Some(user) = self.mapper.find(username).await? else {
            return Err(WardenError::IncorrectPassword);
        };

        match user.state {
            UserState::Active => {}
            UserState::AuthLimitExceeded => {
                return Err(WardenError::RateLimitExceeded {
                    username: user.name.clone(),
                })
            }
            UserState::Disabled => {
                return Err(WardenError::AccountIsNotActive {
                    username: user.name.clone(),
                })
            }
        }

        match (&user.encrypted_password, user.identity_provider()) {
            (Some(hash), _) => {
                if !verify_password_async(password.to_string(), hash.clone()).await {
                    return Err(WardenError::IncorrectPassword);
                }
                if needs_rehash(hash) {
                    upgrade_password_hash(&self.mapper, &user, password).await;
                }
                Ok(UserInfo::from_user(&user))
            }
            // Mirrored from a generic provider: re-check against that provider
            (None, Some(provider)) => {
                let provider = provider.to_string();
                let principal = self
                    .authenticate_with_provider(&provider, username, password)
                    .await?;
                if principal.name != user.name {
                    return Err(WardenError::IncorrectPassword);
                }
                Ok(principal)
            }
            (None, None) => Err(WardenError::IncorrectPassword),
        }
    }

    async fn authenticate_with_provider(
        &self,
        provider_name: &str,
        username: &str,
        password: &str,
    ) -> Result<UserInfo> {
        let (config, provider) = self
            .registry
            .get(provider_name)
            .await
            .map_err(|_| WardenError::provider_not_found(provider_name))?;

        let generic = provider
            .as_generic()
            .cloned()
            .ok_or_else(|| WardenError::provider_not_found(provider_name))?;

        let identity: Identity = with_deadline(
            provider_name,
            self.provider_timeout,
            generic.authenticate(username, password),
        )
        .await
        .map_err(|e| match e {
            WardenError::Unauthorized { .. } => WardenError::IncorrectPassword,
            other => other,
        })?;

        self.mapper.resolve(&identity, &config).await
    }
}

// =============================================================================
// OAuth authenticator
// =============================================================================

pub struct OAuthAuthenticator {
    registry: Arc<ProviderRegistry>,
    mapper: Arc<UserMapper>,
    audit: LoginAudit,
    provider_timeout: Duration,
}

impl OAuthAuthenticator {
    pub fn new(registry: Arc<ProviderRegistry>, mapper: Arc<UserMapper>, audit: LoginAudit) -> Self {
        Self {
            registry,
            mapper,
            audit,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Complete a browser redirect from `provider_name` and record the attempt
    #[instrument(skip(self, request, context))]
    pub async fn authenticate(
        &self,
        provider_name: &str,
        request: &CallbackRequest,
        context: &LoginContext,
    ) -> Result<UserInfo> {
        let mut attempted = String::new();
        let result = self.exchange(provider_name, request, &mut attempted).await;

        let mut context = context.clone();
        context.provider = provider_name.to_string();
        match &result {
            Ok(principal) => {
                self.audit
                    .record(&principal.name, LoginType::OAuth, &context, Ok(()))
                    .await;
                touch_last_login(&self.mapper, principal).await;
            }
            Err(e) => {
                debug!("OAuth login failed: {}", e);
                self.audit
                    .record(&attempted, LoginType::OAuth, &context, Err(e))
                    .await;
            }
        }
        result
    }

    async fn exchange(
        &self,
        provider_name: &str,
        request: &CallbackRequest,
        attempted: &mut String,
    ) -> Result<UserInfo> {
        let (config, provider) = self.registry.get(provider_name).await?;
        let oauth = provider
            .as_oauth()
            .cloned()
            .ok_or_else(|| WardenError::provider_not_found(provider_name))?;

        let identity = with_deadline(
            provider_name,
            self.provider_timeout,
            oauth.identity_exchange_callback(request),
        )
        .await?;
        attempted.clone_from(&identity.username);

        self.mapper.resolve(&identity, &config).await
    }
}
