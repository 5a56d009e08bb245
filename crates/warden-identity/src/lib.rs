//! Warden Identity - Identity providers, user mapping and authentication
//!
//! This crate provides:
//! - Argon2id password hashing (`password`)
//! - Reference providers: LDAP bind, generic OIDC and CAS (`providers`)
//! - The `ProviderRegistry` and the `ConfigurationController` that keeps it
//!   in sync with persisted identity provider documents
//! - The `UserMapper` linking external identities to local users
//! - `PasswordAuthenticator` and `OAuthAuthenticator`
//!
//! # Architecture
//!
//! Providers are built once per configuration by a `ProviderFactory` into an
//! `IdentityProvider`, either an OAuth (redirect) or a generic (credentials)
//! provider. Authenticators look providers up by configuration name, call
//! them under a deadline and resolve the resulting identity per the
//! configuration's mapping method.

pub mod authenticator;
pub mod controller;
pub mod mapper;
pub mod password;
pub mod providers;
pub mod registry;


pub use authenticator::{LoginAudit, OAuthAuthenticator, PasswordAuthenticator};
pub use controller::ConfigurationController;
pub use mapper::UserMapper;
pub use providers::cas::{CasProvider, CasProviderFactory};
pub use providers::ldap::{LdapProvider, LdapProviderFactory};
pub use providers::oidc::{OidcProvider, OidcProviderFactory};
pub use registry::ProviderRegistry;
