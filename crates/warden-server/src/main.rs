//! Warden Authorization Server - Main Server

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod bootstrap;
mod config;

use bootstrap::Bootstrap;
use config::Settings;
use warden_api::AppState;
use warden_core::TokenCache;
use warden_identity::{
    ConfigurationController, LoginAudit, OAuthAuthenticator, PasswordAuthenticator,
    ProviderRegistry, UserMapper,
};
use warden_oauth::{AuthorizationServer, ClientResolver, TokenCodec, TokenManager};
use warden_store::{InMemoryDocumentStore, InMemoryLoginRecorder, InMemoryTokenCache, InMemoryUserRepository};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let settings = Settings::load().context("Failed to load configuration")?;

    info!(
        "Starting Warden Authorization Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = initialize_services(&settings, shutdown_rx).await?;
    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("Server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutting down");
        let _ = shutdown_tx.send(true);
    })
    .await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,warden=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

fn token_cache(settings: &Settings) -> Result<Arc<dyn TokenCache>> {
    match settings.cache.redis_url.as_deref() {
        None => {
            info!("Using in-memory token cache");
            Ok(Arc::new(InMemoryTokenCache::new()))
        }
        #[cfg(feature = "redis")]
        Some(url) => {
            info!("Using Redis token cache");
            let cache = warden_store::RedisTokenCache::open(url)
                .context("Failed to open Redis token cache")?;
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => anyhow::bail!("cache.redis_url is set but the server was built without the redis feature"),
    }
}

async fn initialize_services(
    settings: &Settings,
    mut shutdown: watch::Receiver<bool>,
) -> Result<AppState> {
    let users = Arc::new(InMemoryUserRepository::new());
    let recorder = Arc::new(InMemoryLoginRecorder::new());
    let documents = Arc::new(InMemoryDocumentStore::new());
    let cache = token_cache(settings)?;

    if let Some(path) = &settings.bootstrap.path {
        info!("Seeding stores from {}", path.display());
        Bootstrap::from_file(path)?
            .seed(users.as_ref(), &documents)
            .await?;
    }

    let registry = Arc::new(
        ProviderRegistry::with_builtin_factories()
            .await
            .context("Failed to register identity provider factories")?,
    );
    info!(
        "Identity provider types: {:?}",
        registry.factory_types().await
    );

    // Keep the registry in sync with identity provider documents
    let controller = Arc::new(ConfigurationController::new(
        registry.clone(),
        documents.clone(),
        documents.clone(),
    ));
    tokio::spawn(controller.run(async move {
        let _ = shutdown.changed().await;
    }));

    let codec = TokenCodec::new(&settings.jwt.secret, settings.jwt.issuer.clone())
        .context("Invalid JWT settings")?;
    let token_settings = settings.token_settings();
    if token_settings.access_token_max_age.is_zero() {
        warn!("Access tokens never expire and cannot be revoked (access_token_max_age_secs = 0)");
    }
    let tokens = Arc::new(TokenManager::new(codec, cache.clone(), token_settings));

    let mapper = Arc::new(UserMapper::new(users));
    let audit = LoginAudit::new(recorder);
    let password = PasswordAuthenticator::new(registry.clone(), mapper.clone(), audit.clone())
        .with_provider_timeout(settings.provider_timeout());
    let oauth = OAuthAuthenticator::new(registry.clone(), mapper.clone(), audit)
        .with_provider_timeout(settings.provider_timeout());

    let server = AuthorizationServer::new(
        ClientResolver::new(documents),
        tokens,
        Arc::new(password),
        Arc::new(oauth),
        mapper,
    );

    info!("All services initialized successfully");
    Ok(AppState::new(Arc::new(server), registry, cache))
}

fn create_app(state: AppState) -> Router {
    warden_api::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
