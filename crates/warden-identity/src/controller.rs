//! Configuration controller - hot-reloads identity providers
//!
//! The controller lists every identity provider document once, then applies
//! add/update/delete events from the notifier to the registry. A lagging
//! subscription triggers a full resync.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, instrument, warn};

use warden_core::{
    Configuration, Document, DocumentEvent, DocumentLister, DocumentNotifier, LabelSelector,
    Result, IDENTITY_PROVIDER_CONFIG_TYPE,
};

use crate::registry::ProviderRegistry;

pub struct ConfigurationController {
    registry: Arc<ProviderRegistry>,
    lister: Arc<dyn DocumentLister>,
    notifier: Arc<dyn DocumentNotifier>,
}

impl ConfigurationController {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        lister: Arc<dyn DocumentLister>,
        notifier: Arc<dyn DocumentNotifier>,
    ) -> Self {
        Self {
            registry,
            lister,
            notifier,
        }
    }

    fn selector() -> LabelSelector {
        LabelSelector::config_type(IDENTITY_PROVIDER_CONFIG_TYPE)
    }

    /// Rebuild the registry from a full listing; returns how many providers are active
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<usize> {
        let documents = self.lister.list(&Self::selector()).await?;

        let mut names = Vec::with_capacity(documents.len());
        for document in &documents {
            if let Some(name) = self.apply_document(document).await {
                names.push(name);
            }
        }
        self.registry.retain(&names).await;

        info!("Synchronized {} identity providers", names.len());
        Ok(names.len())
    }

    /// Apply one change event to the registry
    pub async fn handle_event(&self, event: &DocumentEvent) {
        let document = event.document();
        if !Self::selector().matches(&document.labels) {
            return;
        }

        match event {
            DocumentEvent::Added(_) | DocumentEvent::Updated(_) => {
                self.apply_document(document).await;
            }
            DocumentEvent::Deleted(_) => {
                let name = decode_configuration(document)
                    .map(|c| c.name)
                    .unwrap_or_else(|_| document.name.clone());
                self.registry.remove(&name).await;
            }
        }
    }

    /// Decode and apply a document; returns the configuration name when it is active.
    ///
    /// A configuration that fails to build is deactivated so the registry
    /// always reflects the latest document of each name.
    async fn apply_document(&self, document: &Document) -> Option<String> {
        let config = match decode_configuration(document) {
            Ok(config) => config,
            Err(e) => {
                warn!(document = %document.name, "Ignoring malformed identity provider document: {}", e);
                return None;
            }
        };

        let name = config.name.clone();
        match self.registry.apply(config).await {
            Ok(()) => Some(name),
            Err(e) => {
                warn!(provider = %name, "Failed to build identity provider: {}", e);
                self.registry.remove(&name).await;
                None
            }
        }
    }

    /// Watch for changes until `shutdown` resolves
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        // Subscribe before listing so no event between the two is lost
        let mut events = self.notifier.subscribe();
        if let Err(e) = self.sync().await {
            error!("Initial identity provider sync failed: {}", e);
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Configuration controller stopped");
                    return;
                }
                received = events.recv() => match received {
                    Ok(event) => {
                        debug!(document = %event.document().name, "Configuration event");
                        self.handle_event(&event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Configuration watch lagged by {} events, resyncing", skipped);
                        if let Err(e) = self.sync().await {
                            error!("Identity provider resync failed: {}", e);
                        }
                    }
                    Err(RecvError::Closed) => {
                        warn!("Configuration watch closed");
                        return;
                    }
                }
            }
        }
    }
}

fn decode_configuration(document: &Document) -> Result<Configuration> {
    document.decode()
}
