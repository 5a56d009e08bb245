//! Reference identity providers and their factories

pub mod cas;
pub mod common;
pub mod ldap;
pub mod oidc;

use std::sync::Arc;

use warden_core::ProviderFactory;

/// Factories for every provider type shipped with this crate
pub fn builtin_factories() -> Vec<Arc<dyn ProviderFactory>> {
    vec![
        Arc::new(ldap::LdapProviderFactory),
        Arc::new(oidc::OidcProviderFactory),
        Arc::new(cas::CasProviderFactory),
    ]
}
