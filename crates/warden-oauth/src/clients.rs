//! OAuth client lookup over persisted client documents

use std::sync::Arc;
use tracing::warn;

use warden_core::{
    Client, DocumentLister, LabelSelector, Result, WardenError, OAUTH_CLIENT_CONFIG_TYPE,
};

/// Resolves OAuth clients by name from labeled documents
#[derive(Clone)]
pub struct ClientResolver {
    documents: Arc<dyn DocumentLister>,
}

impl ClientResolver {
    pub fn new(documents: Arc<dyn DocumentLister>) -> Self {
        Self { documents }
    }

    /// All decodable clients; malformed documents are skipped
    pub async fn list(&self) -> Result<Vec<Client>> {
        let docs = self
            .documents
            .list(&LabelSelector::config_type(OAUTH_CLIENT_CONFIG_TYPE))
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match doc.decode::<Client>() {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!("Skipping malformed OAuth client document {}: {}", doc.name, e);
                    None
                }
            })
            .collect())
    }

    pub async fn get(&self, name: &str) -> Result<Client> {
        self.list()
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| WardenError::client_not_found(name))
    }
}
