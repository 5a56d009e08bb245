//! In-memory repositories

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, instrument};

use warden_core::{
    Document, DocumentEvent, DocumentLister, DocumentNotifier, LabelSelector, LoginRecord,
    LoginRecorder, Result, User, UserRepository, WardenError,
};

/// Capacity of the document change channel; slow subscribers observe `Lagged`
const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Users
// =============================================================================

/// In-memory implementation of UserRepository keyed by user name
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    #[instrument(skip(self))]
    async fn get(&self, name: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut list: Vec<User> = users.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    #[instrument(skip(self, user), fields(user = %user.name))]
    async fn create(&self, user: &User) -> Result<User> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.name) {
            return Err(WardenError::storage_error(format!(
                "User {} already exists",
                user.name
            )));
        }
        users.insert(user.name.clone(), user.clone());
        debug!("Created user");
        Ok(user.clone())
    }

    #[instrument(skip(self, user), fields(user = %user.name))]
    async fn update(&self, user: &User) -> Result<User> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.name) {
            Some(existing) => {
                *existing = user.clone();
                Ok(user.clone())
            }
            None => Err(WardenError::UserNotFound {
                name: user.name.clone(),
            }),
        }
    }
}

// =============================================================================
// Login records
// =============================================================================

/// In-memory append-only login audit log
#[derive(Default)]
pub struct InMemoryLoginRecorder {
    records: RwLock<Vec<LoginRecord>>,
}

impl InMemoryLoginRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, oldest first
    pub async fn records(&self) -> Vec<LoginRecord> {
        self.records.read().await.clone()
    }

    pub async fn records_for(&self, username: &str) -> Vec<LoginRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.username == username)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LoginRecorder for InMemoryLoginRecorder {
    async fn record(&self, record: &LoginRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}

// =============================================================================
// Documents
// =============================================================================

/// In-memory labeled document store that broadcasts every change
pub struct InMemoryDocumentStore {
    documents: RwLock<BTreeMap<String, Document>>,
    events: broadcast::Sender<DocumentEvent>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            documents: RwLock::new(BTreeMap::new()),
            events,
        }
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<Document> {
        self.documents.read().await.get(name).cloned()
    }

    /// Insert or replace a document and notify subscribers
    #[instrument(skip(self, document), fields(document = %document.name))]
    pub async fn put(&self, document: Document) {
        let previous = self
            .documents
            .write()
            .await
            .insert(document.name.clone(), document.clone());

        let event = match previous {
            Some(_) => DocumentEvent::Updated(document),
            None => DocumentEvent::Added(document),
        };
        // No receivers is not an error
        let _ = self.events.send(event);
    }

    /// Remove a document; returns whether it existed
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> bool {
        let removed = self.documents.write().await.remove(name);
        match removed {
            Some(document) => {
                let _ = self.events.send(DocumentEvent::Deleted(document));
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl DocumentLister for InMemoryDocumentStore {
    async fn list(&self, selector: &LabelSelector) -> Result<Vec<Document>> {
        Ok(self
            .documents
            .read()
            .await
            .values()
            .filter(|d| selector.matches(&d.labels))
            .cloned()
            .collect())
    }
}

impl DocumentNotifier for InMemoryDocumentStore {
    fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }
}
