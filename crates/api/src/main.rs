mod config;
mod error;
mod middleware;
mod routes;
mod state;

use std::sync::Arc;

use pressroom_core::cache::private::PrivateRouteCache;
use pressroom_core::cache::{BlobPort, MemoryBlobStore, MemoryCache};
use pressroom_core::events::EventBus;
use pressroom_core::preview::PreviewService;
use pressroom_core::release::builder::ReleaseBuilder;
use pressroom_core::release::store::ReleaseStore;
use pressroom_core::store::kv::{KvReleaseStore, MemoryKv};
use pressroom_core::store::memory::MemoryStore;
use pressroom_core::store::postgres::PgStore;
use pressroom_core::store::{Backend, DocumentStore};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience)
    let _ = dotenvy::dotenv();

    let config = config::AppConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    tracing::info!("Starting Pressroom API server");

    let backend = config.backend()?;
    let blobs: Arc<dyn BlobPort> =
        Arc::new(MemoryBlobStore::new(config.preview_key.as_bytes().to_vec()));

    let (documents, releases): (Arc<dyn DocumentStore>, Arc<dyn ReleaseStore>) = match backend {
        Backend::Memory => {
            let store = Arc::new(MemoryStore::new(blobs.clone()));
            (store.clone(), store)
        }
        Backend::Kv => {
            // Documents stay in memory; the release store runs on the
            // key-value backend.
            let documents = Arc::new(MemoryStore::new(blobs.clone()));
            let releases = Arc::new(KvReleaseStore::new(MemoryKv::new(), blobs.clone()));
            (documents, releases)
        }
        Backend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("postgres backend requires DATABASE_URL"))?;
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(database_url)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to database: {e}"))?;
            tracing::info!("Connected to PostgreSQL");

            sqlx::migrate!("../../migrations")
                .run(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;
            tracing::info!("Database migrations applied");

            let store = Arc::new(PgStore::new(pool, blobs.clone()));
            (store.clone() as Arc<dyn DocumentStore>, store)
        }
    };

    // Atomicity is a configuration property; surface it at boot.
    tracing::info!(
        backend = backend.as_str(),
        atomic_pointer_swap = releases.supports_atomic_swap(),
        "storage backend selected"
    );
    if !releases.supports_atomic_swap() {
        tracing::warn!("release pointer switches on this backend are not transactional");
    }

    let event_bus = EventBus::new(config.event_bus_capacity);
    let builder = ReleaseBuilder::new(documents.clone(), releases.clone(), event_bus.clone());
    let preview = PreviewService::new(config.preview_key.as_bytes().to_vec());
    let private_cache = PrivateRouteCache::new(
        releases.clone(),
        documents.clone(),
        blobs.clone(),
        Arc::new(MemoryCache::new()),
        config.scope_key.as_bytes().to_vec(),
        config.private_cache_ttl_seconds,
    );

    let state = state::AppState::new(
        documents,
        releases,
        blobs,
        builder,
        preview,
        private_cache,
        event_bus,
        config.clone(),
    );

    // Build router with middleware
    let app = routes::build_router(state)
        .layer(middleware::request_tracing::trace_layer())
        .layer(middleware::cors::cors_layer());

    // Start server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { tracing::info!("Received Ctrl+C, shutting down..."); }
        _ = terminate => { tracing::info!("Received SIGTERM, shutting down..."); }
    }
}
