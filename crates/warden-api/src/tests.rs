//! Router tests for warden-api

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use warden_core::{
    CallbackRequest, Client, Configuration, Document, GrantMethod, Identity, IdentityProvider,
    LoginType, MappingMethod, OAuthProvider, ProviderFactory, ProviderOptions, Result, User,
    UserRepository, UserState, WardenError, OAUTH_CLIENT_CONFIG_TYPE,
};
use warden_identity::password::hash_password;
use warden_identity::{LoginAudit, OAuthAuthenticator, PasswordAuthenticator, ProviderRegistry, UserMapper};
use warden_oauth::{AuthorizationServer, ClientResolver, TokenCodec, TokenManager, TokenSettings};
use warden_store::{InMemoryDocumentStore, InMemoryLoginRecorder, InMemoryTokenCache, InMemoryUserRepository};

use crate::{create_router, AppState};

// =============================================================================
// Fixture
// =============================================================================

struct CodeEcho;

#[async_trait]
impl OAuthProvider for CodeEcho {
    async fn identity_exchange_callback(&self, request: &CallbackRequest) -> Result<Identity> {
        let code = request
            .param("code")
            .ok_or_else(|| WardenError::invalid_input("missing code"))?;
        Ok(Identity::new(format!("uid-{}", code), code, ""))
    }
}

struct CodeEchoFactory;

#[async_trait]
impl ProviderFactory for CodeEchoFactory {
    fn provider_type(&self) -> &'static str {
        "EchoIdentityProvider"
    }

    async fn create(&self, _options: &ProviderOptions) -> Result<IdentityProvider> {
        Ok(IdentityProvider::OAuth(Arc::new(CodeEcho)))
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    recorder: Arc<InMemoryLoginRecorder>,
}

async fn test_app() -> TestApp {
    let documents = Arc::new(InMemoryDocumentStore::new());
    let users = Arc::new(InMemoryUserRepository::new());
    let recorder = Arc::new(InMemoryLoginRecorder::new());
    let cache = Arc::new(InMemoryTokenCache::new());

    let registry = Arc::new(ProviderRegistry::new());
    registry
        .register_factory(Arc::new(CodeEchoFactory))
        .await
        .unwrap();
    registry
        .apply(Configuration {
            name: "echo".to_string(),
            provider_type: "EchoIdentityProvider".to_string(),
            mapping_method: MappingMethod::Auto,
            provider: ProviderOptions::default(),
        })
        .await
        .unwrap();

    users
        .create(&User::new("alice", "alice@example.com").with_password_hash(hash_password("P@88w0rd").unwrap()))
        .await
        .unwrap();
    users
        .create(
            &User::new("mallory", "")
                .with_password_hash(hash_password("P@88w0rd").unwrap())
                .with_state(UserState::AuthLimitExceeded),
        )
        .await
        .unwrap();

    let client = Client {
        name: "kubectl".to_string(),
        secret: "kubectl-secret".to_string(),
        redirect_uris: vec!["https://foo/cb".to_string()],
        grant_method: GrantMethod::Auto,
        scope_restrictions: vec![],
        access_token_max_age: None,
        access_token_inactivity_timeout: None,
    };
    documents
        .put(Document::from_payload("oauthclient-kubectl", OAUTH_CLIENT_CONFIG_TYPE, &client).unwrap())
        .await;

    let mapper = Arc::new(UserMapper::new(users.clone()));
    let audit = LoginAudit::new(recorder.clone());
    let tokens = Arc::new(TokenManager::new(
        TokenCodec::new("test-secret-key-for-testing-only-32b", "warden-test").unwrap(),
        cache.clone(),
        TokenSettings::default(),
    ));
    let server = Arc::new(AuthorizationServer::new(
        ClientResolver::new(documents.clone()),
        tokens,
        Arc::new(PasswordAuthenticator::new(registry.clone(), mapper.clone(), audit.clone())),
        Arc::new(OAuthAuthenticator::new(registry.clone(), mapper.clone(), audit)),
        mapper,
    ));

    let state = AppState::new(server, registry, cache);
    TestApp {
        router: create_router(state.clone()),
        state,
        recorder,
    }
}

async fn access_token_for(app: &TestApp, name: &str) -> String {
    let principal = warden_core::UserInfo::from_user(&User::new(name, ""));
    app.state
        .server
        .tokens()
        .issue_token_pair(&principal, None, None)
        .await
        .unwrap()
        .access_token
}

fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
}

fn form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

fn query_value(url: &str, key: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.to_string())
    })
}

const AUTHORIZE: &str = "/oauth/authorize?client_id=kubectl&response_type=code&state=xyz&nonce=abc";

// =============================================================================
// Health Tests
// =============================================================================

#[cfg(test)]
mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness_has_request_id() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(json_body(response).await["status"], "alive");
    }

    #[tokio::test]
    async fn test_health_reports_components() {
        let app = test_app().await;
        let response = app
            .router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["components"].as_array().unwrap().len(), 2);

        let ready = app
            .router
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::OK);
    }
}

// =============================================================================
// OAuth Endpoint Tests
// =============================================================================

#[cfg(test)]
mod oauth_tests {
    use super::*;

    #[tokio::test]
    async fn test_authorize_requires_login() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(Request::get(AUTHORIZE).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "login_required");
    }

    #[tokio::test]
    async fn test_authorize_unknown_client() {
        let app = test_app().await;
        let token = access_token_for(&app, "alice").await;
        let response = app
            .router
            .oneshot(
                Request::get("/oauth/authorize?client_id=nope&response_type=code")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "invalid_client");
    }

    #[tokio::test]
    async fn test_code_flow_over_http() {
        let app = test_app().await;
        let token = access_token_for(&app, "alice").await;

        let response = app
            .router
            .clone()
            .oneshot(
                Request::get(AUTHORIZE)
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let redirect = location(&response);
        assert!(redirect.starts_with("https://foo/cb?code="));
        assert_eq!(query_value(&redirect, "state").as_deref(), Some("xyz"));
        let code = query_value(&redirect, "code").unwrap();

        let mut request = form(
            "/oauth/token",
            &format!("grant_type=authorization_code&code={}", code),
        );
        request.headers_mut().insert(
            header::AUTHORIZATION,
            basic("kubectl", "kubectl-secret").parse().unwrap(),
        );
        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        let body = json_body(response).await;
        assert_eq!(body["token_type"], "Bearer");
        assert!(body["id_token"].is_string());
        assert!(body["refresh_token"].is_string());
    }

    #[tokio::test]
    async fn test_authorize_with_basic_credentials_records_login() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(
                Request::get(AUTHORIZE)
                    .header(header::AUTHORIZATION, basic("alice", "P@88w0rd"))
                    .header(header::USER_AGENT, "kubectl/1.31")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);

        let records = app.recorder.records_for("alice").await;
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert_eq!(records[0].login_type, LoginType::BasicAuth);
        assert_eq!(records[0].user_agent, "kubectl/1.31");
    }

    #[tokio::test]
    async fn test_password_grant() {
        let app = test_app().await;
        let response = app
            .router
            .clone()
            .oneshot(form(
                "/oauth/token",
                "grant_type=password&client_id=kubectl&client_secret=kubectl-secret&username=alice&password=P%4088w0rd",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json_body(response).await["access_token"].is_string());

        let response = app
            .router
            .oneshot(form(
                "/oauth/token",
                "grant_type=password&client_id=kubectl&client_secret=wrong&username=alice&password=P%4088w0rd",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "invalid_client");
    }

    #[tokio::test]
    async fn test_rate_limited_login_is_too_many_requests() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(form(
                "/oauth/token",
                "grant_type=password&client_id=kubectl&client_secret=kubectl-secret&username=mallory&password=P%4088w0rd",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(response).await["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn test_unsupported_grant_type() {
        let app = test_app().await;
        let response = app
            .router
            .oneshot(form(
                "/oauth/token",
                "grant_type=client_credentials&client_id=kubectl&client_secret=kubectl-secret",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "unsupported_grant_type");
    }

    #[tokio::test]
    async fn test_callback() {
        let app = test_app().await;
        let response = app
            .router
            .clone()
            .oneshot(
                Request::get("/oauth/callback/echo?code=bob")
                    .header("x-forwarded-for", "10.0.0.7, 10.0.0.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json_body(response).await["access_token"].is_string());

        let records = app.recorder.records_for("bob").await;
        assert_eq!(records[0].source_ip, "10.0.0.7");
        assert_eq!(records[0].provider, "echo");

        let response = app
            .router
            .oneshot(
                Request::get("/oauth/callback/missing?code=bob")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_revokes_tokens() {
        let app = test_app().await;
        let token = access_token_for(&app, "alice").await;

        let response = app
            .router
            .clone()
            .oneshot(
                Request::get("/oauth/logout?post_logout_redirect_uri=https%3A%2F%2Ffoo%2Fbye&state=s1")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "https://foo/bye?state=s1");

        let review = serde_json::json!({"spec": {"token": token}});
        let response = app
            .router
            .oneshot(
                Request::post("/oauth/authenticate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(review.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"]["authenticated"], false);
    }

    #[tokio::test]
    async fn test_token_review_and_revoke() {
        let app = test_app().await;
        let token = access_token_for(&app, "alice").await;
        let review = serde_json::json!({
            "apiVersion": "authentication.k8s.io/v1",
            "kind": "TokenReview",
            "spec": {"token": token}
        });

        let response = app
            .router
            .clone()
            .oneshot(
                Request::post("/oauth/authenticate")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(review.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["kind"], "TokenReview");
        assert_eq!(body["status"]["authenticated"], true);
        assert_eq!(body["status"]["user"]["name"], "alice");

        let response = app
            .router
            .clone()
            .oneshot(form("/oauth/revoke", &format!("token={}", token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Revoking again is not an error
        let response = app
            .router
            .oneshot(form("/oauth/revoke", &format!("token={}", token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(app.state.server.tokens().verify(&token).await.is_err());
    }
}
