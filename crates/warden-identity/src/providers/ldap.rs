//! LDAP identity provider
//!
//! Authenticates directly presented credentials: the user entry is located
//! with a service-account search, then the password is checked by binding as
//! that entry. Requires the `ldap` feature.

#[cfg(feature = "ldap")]
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
#[cfg(feature = "ldap")]
use std::time::Duration;
use tracing::instrument;
#[cfg(feature = "ldap")]
use tracing::{debug, warn};

use warden_core::{
    GenericProvider, Identity, IdentityProvider, ProviderFactory, ProviderOptions, Result,
    WardenError,
};

use super::common::default_timeout_secs;

pub const LDAP_PROVIDER_TYPE: &str = "LDAPIdentityProvider";

/// Placeholder substituted with the escaped login name in `userSearchFilter`
pub const USERNAME_PLACEHOLDER: &str = "{username}";

/// Options document of an `LDAPIdentityProvider` configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapOptions {
    /// e.g. `ldap://ldap.example.com:389` or `ldaps://...`
    pub url: String,
    #[serde(default)]
    pub bind_dn: String,
    #[serde(default)]
    pub bind_password: String,
    pub user_search_base: String,
    #[serde(default = "default_user_search_filter")]
    pub user_search_filter: String,
    #[serde(default = "default_username_attribute")]
    pub username_attribute: String,
    #[serde(default = "default_email_attribute")]
    pub email_attribute: String,
    /// Attribute holding the stable user id; the entry DN when absent
    #[serde(default)]
    pub user_id_attribute: Option<String>,
    #[serde(default)]
    pub start_tls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_user_search_filter() -> String {
    format!("(uid={})", USERNAME_PLACEHOLDER)
}

fn default_username_attribute() -> String {
    "uid".to_string()
}

fn default_email_attribute() -> String {
    "mail".to_string()
}

impl LdapOptions {
    fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ldap://") || self.url.starts_with("ldaps://")) {
            return Err(WardenError::invalid_options(
                LDAP_PROVIDER_TYPE,
                "url must start with ldap:// or ldaps://",
            ));
        }
        if self.user_search_base.is_empty() {
            return Err(WardenError::invalid_options(
                LDAP_PROVIDER_TYPE,
                "userSearchBase must not be empty",
            ));
        }
        if !self.user_search_filter.contains(USERNAME_PLACEHOLDER) {
            return Err(WardenError::invalid_options(
                LDAP_PROVIDER_TYPE,
                format!("userSearchFilter must contain {}", USERNAME_PLACEHOLDER),
            ));
        }
        Ok(())
    }

    /// Search filter for `username`, escaped per RFC 4515
    #[cfg(feature = "ldap")]
    fn filter_for(&self, username: &str) -> String {
        self.user_search_filter
            .replace(USERNAME_PLACEHOLDER, &ldap3::ldap_escape(username))
    }
}

pub struct LdapProvider {
    options: LdapOptions,
}

impl LdapProvider {
    pub fn new(options: LdapOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &LdapOptions {
        &self.options
    }

    #[cfg(feature = "ldap")]
    async fn connect(&self) -> Result<ldap3::Ldap> {
        let settings = LdapConnSettings::new()
            .set_starttls(self.options.start_tls)
            .set_conn_timeout(Duration::from_secs(self.options.timeout_secs));

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.options.url)
            .await
            .map_err(|e| {
                WardenError::provider(LDAP_PROVIDER_TYPE, format!("Connection failed: {}", e))
            })?;

        ldap3::drive!(conn);
        Ok(ldap)
    }

    #[cfg(feature = "ldap")]
    async fn find_user(&self, ldap: &mut ldap3::Ldap, username: &str) -> Result<Option<SearchEntry>> {
        if !self.options.bind_dn.is_empty() {
            ldap.simple_bind(&self.options.bind_dn, &self.options.bind_password)
                .await
                .and_then(|r| r.success())
                .map_err(|e| {
                    WardenError::provider(LDAP_PROVIDER_TYPE, format!("Service bind failed: {}", e))
                })?;
        }

        let mut attributes = vec![
            self.options.username_attribute.as_str(),
            self.options.email_attribute.as_str(),
        ];
        if let Some(attr) = &self.options.user_id_attribute {
            attributes.push(attr.as_str());
        }

        let (entries, _) = ldap
            .search(
                &self.options.user_search_base,
                Scope::Subtree,
                &self.options.filter_for(username),
                attributes,
            )
            .await
            .and_then(|r| r.success())
            .map_err(|e| WardenError::provider(LDAP_PROVIDER_TYPE, format!("Search failed: {}", e)))?;

        if entries.len() != 1 {
            debug!(matches = entries.len(), "User search did not yield exactly one entry");
            return Ok(None);
        }
        Ok(entries.into_iter().next().map(SearchEntry::construct))
    }

    #[cfg(feature = "ldap")]
    fn identity_from_entry(&self, entry: &SearchEntry, username: &str) -> Identity {
        let first = |attr: &str| entry.attrs.get(attr).and_then(|v| v.first()).cloned();

        let user_id = self
            .options
            .user_id_attribute
            .as_deref()
            .and_then(first)
            .unwrap_or_else(|| entry.dn.clone());
        let name = first(&self.options.username_attribute).unwrap_or_else(|| username.to_string());
        let email = first(&self.options.email_attribute).unwrap_or_default();

        Identity::new(user_id, name, email)
    }
}

#[async_trait]
impl GenericProvider for LdapProvider {
    #[instrument(skip(self, password))]
    async fn authenticate(&self, username: &str, password: &str) -> Result<Identity> {
        // An empty password would be an unauthenticated bind
        if username.is_empty() || password.is_empty() {
            return Err(WardenError::unauthorized(LDAP_PROVIDER_TYPE));
        }

        #[cfg(feature = "ldap")]
        {
            let mut ldap = self.connect().await?;

            let Some(entry) = self.find_user(&mut ldap, username).await? else {
                let _ = ldap.unbind().await;
                return Err(WardenError::unauthorized(LDAP_PROVIDER_TYPE));
            };

            let bound = ldap
                .simple_bind(&entry.dn, password)
                .await
                .and_then(|r| r.success());
            let _ = ldap.unbind().await;

            if let Err(e) = bound {
                warn!(dn = %entry.dn, "User bind rejected: {}", e);
                return Err(WardenError::unauthorized(LDAP_PROVIDER_TYPE));
            }

            Ok(self.identity_from_entry(&entry, username))
        }

        #[cfg(not(feature = "ldap"))]
        {
            Err(WardenError::config_error(
                "LDAP support not enabled. Compile with --features ldap",
            ))
        }
    }
}

/// Factory for `LDAPIdentityProvider` configurations
#[derive(Debug, Default)]
pub struct LdapProviderFactory;

#[async_trait]
impl ProviderFactory for LdapProviderFactory {
    fn provider_type(&self) -> &'static str {
        LDAP_PROVIDER_TYPE
    }

    async fn create(&self, options: &ProviderOptions) -> Result<IdentityProvider> {
        let options: LdapOptions = options.decode(LDAP_PROVIDER_TYPE)?;
        Ok(IdentityProvider::Generic(Arc::new(LdapProvider::new(options)?)))
    }
}
