//! Unit tests for warden-store

use super::*;

// =============================================================================
// Token Cache Tests
// =============================================================================

#[cfg(test)]
mod cache_tests {
    use super::*;
    use std::time::Duration;
    use warden_core::TokenCache;

    #[tokio::test]
    async fn test_keys_follow_glob_syntax() {
        let cache = InMemoryTokenCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("user:alice:token:abc", "", ttl).await.unwrap();
        cache.set("user:ali*:token:abd", "", ttl).await.unwrap();
        cache.set(r"user:a\b:token:abe", "", ttl).await.unwrap();

        assert_eq!(cache.keys("user:*:token:abc").await.unwrap().len(), 1);
        assert!(cache.keys("user:*:token:ab").await.unwrap().is_empty());
        assert_eq!(cache.keys("user:ali*:token:*").await.unwrap().len(), 2);

        let escaped = format!("user:{}:token:*", globset::escape("ali*"));
        assert_eq!(
            cache.keys(&escaped).await.unwrap(),
            vec!["user:ali*:token:abd".to_string()]
        );

        let backslash = format!("user:{}:token:*", globset::escape(r"a\b"));
        assert_eq!(cache.keys(&backslash).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_cache_error() {
        let cache = InMemoryTokenCache::new();
        let err = cache.keys("user:[a:token:*").await.unwrap_err();
        assert!(matches!(err, warden_core::WardenError::Cache { .. }));
    }

    #[tokio::test]
    async fn test_set_get_del() {
        let cache = InMemoryTokenCache::new();
        cache
            .set("user:alice:token:t1", "v", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            cache.get("user:alice:token:t1").await.unwrap().as_deref(),
            Some("v")
        );
        assert!(cache
            .exists(&["user:alice:token:t1".to_string()])
            .await
            .unwrap());

        cache
            .del(&["user:alice:token:t1".to_string()])
            .await
            .unwrap();
        assert!(cache.get("user:alice:token:t1").await.unwrap().is_none());
        assert!(!cache
            .exists(&["user:alice:token:t1".to_string()])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_keys_by_pattern() {
        let cache = InMemoryTokenCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("user:alice:token:t1", "", ttl).await.unwrap();
        cache.set("user:alice:token:t2", "", ttl).await.unwrap();
        cache.set("user:bob:token:t3", "", ttl).await.unwrap();

        let mut alice = cache.keys("user:alice:token:*").await.unwrap();
        alice.sort();
        assert_eq!(alice, vec!["user:alice:token:t1", "user:alice:token:t2"]);

        let by_token = cache.keys("user:*:token:t3").await.unwrap();
        assert_eq!(by_token, vec!["user:bob:token:t3"]);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = InMemoryTokenCache::new();
        cache
            .set("k", "v", Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.keys("*").await.unwrap().is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = InMemoryTokenCache::new();
        cache.set("short", "", Duration::from_millis(10)).await.unwrap();
        cache.set("long", "", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}

// =============================================================================
// Repository Tests
// =============================================================================

#[cfg(test)]
mod repository_tests {
    use super::*;
    use warden_core::{
        Document, DocumentEvent, DocumentLister, DocumentNotifier, LabelSelector, LoginContext,
        LoginRecord, LoginRecorder, LoginType, User, UserRepository, UserState,
        IDENTITY_PROVIDER_CONFIG_TYPE, OAUTH_CLIENT_CONFIG_TYPE,
    };

    #[tokio::test]
    async fn test_user_create_is_exclusive() {
        let repo = InMemoryUserRepository::new();
        let user = User::new("alice", "alice@example.com");

        repo.create(&user).await.unwrap();
        assert!(repo.create(&user).await.is_err());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_user_update() {
        let repo = InMemoryUserRepository::new();
        let user = repo
            .create(&User::new("alice", "alice@example.com"))
            .await
            .unwrap();

        let disabled = user.with_state(UserState::Disabled);
        repo.update(&disabled).await.unwrap();

        let stored = repo.get("alice").await.unwrap().unwrap();
        assert_eq!(stored.state, UserState::Disabled);

        let ghost = User::new("ghost", "");
        assert!(repo.update(&ghost).await.is_err());
    }

    #[tokio::test]
    async fn test_login_recorder_keeps_order() {
        let recorder = InMemoryLoginRecorder::new();
        let ctx = LoginContext::default();
        recorder
            .record(&LoginRecord::new("alice", LoginType::Token, &ctx, Ok(())))
            .await
            .unwrap();
        recorder
            .record(&LoginRecord::new("bob", LoginType::OAuth, &ctx, Ok(())))
            .await
            .unwrap();

        let all = recorder.records().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].username, "alice");
        assert_eq!(recorder.records_for("bob").await.len(), 1);
    }

    #[tokio::test]
    async fn test_document_store_lists_by_selector() {
        let store = InMemoryDocumentStore::new();
        store
            .put(Document::from_payload("c1", OAUTH_CLIENT_CONFIG_TYPE, &"a").unwrap())
            .await;
        store
            .put(Document::from_payload("p1", IDENTITY_PROVIDER_CONFIG_TYPE, &"b").unwrap())
            .await;

        let clients = store
            .list(&LabelSelector::config_type(OAUTH_CLIENT_CONFIG_TYPE))
            .await
            .unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name, "c1");
    }

    #[tokio::test]
    async fn test_document_store_broadcasts_changes() {
        let store = InMemoryDocumentStore::new();
        let mut events = store.subscribe();

        let doc = Document::from_payload("p1", IDENTITY_PROVIDER_CONFIG_TYPE, &"v1").unwrap();
        store.put(doc.clone()).await;
        store.put(doc.clone()).await;
        assert!(store.delete("p1").await);
        assert!(!store.delete("p1").await);

        assert!(matches!(events.recv().await.unwrap(), DocumentEvent::Added(_)));
        assert!(matches!(events.recv().await.unwrap(), DocumentEvent::Updated(_)));
        match events.recv().await.unwrap() {
            DocumentEvent::Deleted(d) => assert_eq!(d.name, "p1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
