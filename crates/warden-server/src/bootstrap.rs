//! Seeding of users, identity providers and OAuth clients from a YAML file

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use warden_core::{
    Client, Configuration, Document, User, UserRepository, UserState,
    IDENTITY_PROVIDER_CONFIG_TYPE, OAUTH_CLIENT_CONFIG_TYPE,
};
use warden_identity::password::{generate_password, hash_password_async};
use warden_store::InMemoryDocumentStore;

const GENERATED_PASSWORD_LENGTH: usize = 16;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    #[serde(default)]
    pub users: Vec<BootstrapUser>,
    #[serde(default)]
    pub identity_providers: Vec<Configuration>,
    #[serde(default)]
    pub clients: Vec<Client>,
}

#[derive(Debug, Deserialize)]
pub struct BootstrapUser {
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Plain-text password, hashed before storing
    pub password: Option<String>,
    #[serde(default)]
    pub state: UserState,
    /// Must change the password on first login
    #[serde(default)]
    pub uninitialized: bool,
}

impl Bootstrap {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bootstrap file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse bootstrap file {}", path.display()))
    }

    /// Write every entry into the stores; users that already exist are kept
    pub async fn seed(
        self,
        users: &dyn UserRepository,
        documents: &InMemoryDocumentStore,
    ) -> Result<()> {
        for entry in self.users {
            if users.get(&entry.name).await?.is_some() {
                info!("User {} already exists, skipping", entry.name);
                continue;
            }

            let password = match entry.password {
                Some(password) => password,
                None => {
                    warn!(
                        "User {} has no password, a random one is set until an administrator resets it",
                        entry.name
                    );
                    generate_password(GENERATED_PASSWORD_LENGTH)
                }
            };
            let hash = hash_password_async(password).await?;

            let mut user = User::new(&entry.name, entry.email)
                .with_password_hash(hash)
                .with_state(entry.state);
            user.uninitialized = entry.uninitialized;
            users
                .create(&user)
                .await
                .with_context(|| format!("Failed to create user {}", entry.name))?;
            info!("Seeded user {}", entry.name);
        }

        for provider in self.identity_providers {
            let doc = Document::from_payload(
                format!("{}-{}", IDENTITY_PROVIDER_CONFIG_TYPE, provider.name),
                IDENTITY_PROVIDER_CONFIG_TYPE,
                &provider,
            )?;
            documents.put(doc).await;
            info!("Seeded identity provider {} ({})", provider.name, provider.provider_type);
        }

        for client in self.clients {
            let doc = Document::from_payload(
                format!("{}-{}", OAUTH_CLIENT_CONFIG_TYPE, client.name),
                OAUTH_CLIENT_CONFIG_TYPE,
                &client,
            )?;
            documents.put(doc).await;
            info!("Seeded OAuth client {}", client.name);
        }

        Ok(())
    }
}
