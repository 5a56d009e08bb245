//! User mapper - links external identities to local users

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use warden_core::{
    Configuration, Identity, MappingMethod, Result, User, UserInfo, UserRepository, WardenError,
    IDENTITY_PROVIDER_LABEL, ORIGIN_UID_LABEL,
};

pub struct UserMapper {
    users: Arc<dyn UserRepository>,
}

impl UserMapper {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    pub fn users(&self) -> &Arc<dyn UserRepository> {
        &self.users
    }

    /// Find a user by exact name, or by email when the input looks like one.
    ///
    /// The email lookup scans every user.
    pub async fn find(&self, username: &str) -> Result<Option<User>> {
        if let Some(user) = self.users.get(username).await? {
            return Ok(Some(user));
        }
        if !username.contains('@') {
            return Ok(None);
        }
        Ok(self
            .users
            .list()
            .await?
            .into_iter()
            .find(|u| !u.email.is_empty() && u.email.eq_ignore_ascii_case(username)))
    }

    /// The single user carrying both origin labels for this provider and uid.
    ///
    /// Zero or several matches both mean no mapping.
    pub async fn find_mapped_user(&self, provider: &str, external_uid: &str) -> Result<Option<User>> {
        let mut matches = self.users.list().await?.into_iter().filter(|u| {
            u.identity_provider() == Some(provider) && u.origin_uid() == Some(external_uid)
        });

        match (matches.next(), matches.next()) {
            (Some(user), None) => Ok(Some(user)),
            (Some(_), Some(_)) => {
                warn!(provider, external_uid, "Identity is mapped to several users");
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Resolve an authenticated identity into a principal per the
    /// configuration's mapping method
    #[instrument(skip(self, identity, config), fields(provider = %config.name, method = %config.mapping_method))]
    pub async fn resolve(&self, identity: &Identity, config: &Configuration) -> Result<UserInfo> {
        if let Some(user) = self.find_mapped_user(&config.name, &identity.user_id).await? {
            return principal_for(&user);
        }

        match config.mapping_method {
            MappingMethod::Lookup => {
                debug!(external_uid = %identity.user_id, "No mapped user for lookup provider");
                Err(WardenError::UserNotFound {
                    name: identity.username.clone(),
                })
            }
            MappingMethod::Manual => Ok(UserInfo::pre_registration(&config.name, identity)),
            MappingMethod::Auto => {
                let user = self.create_mapped_user(identity, &config.name).await?;
                principal_for(&user)
            }
            MappingMethod::Mixed => Err(WardenError::InvalidMappingMethod {
                method: config.mapping_method.to_string(),
            }),
        }
    }

    async fn create_mapped_user(&self, identity: &Identity, provider: &str) -> Result<User> {
        let user = User::new(identity.username.to_lowercase(), identity.email.clone())
            .with_label(IDENTITY_PROVIDER_LABEL, provider)
            .with_label(ORIGIN_UID_LABEL, identity.user_id.clone());

        match self.users.create(&user).await {
            Ok(created) => {
                info!(user = %created.name, "Created user for external identity");
                Ok(created)
            }
            Err(e) => {
                // A concurrent login may have created the mapping first
                match self.find_mapped_user(provider, &identity.user_id).await? {
                    Some(existing) => Ok(existing),
                    None => Err(e),
                }
            }
        }
    }
}

fn principal_for(user: &User) -> Result<UserInfo> {
    if !user.is_active() {
        return Err(WardenError::AccountIsNotActive {
            username: user.name.clone(),
        });
    }
    Ok(UserInfo::from_user(user))
}
