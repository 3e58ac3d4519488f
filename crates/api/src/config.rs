use std::env;

use pressroom_core::store::Backend;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host to bind to.
    pub host: String,
    /// Server port to bind to.
    pub port: u16,
    /// PostgreSQL connection URL; absent means a non-relational
    /// backend.
    pub database_url: Option<String>,
    /// Explicit backend override (`memory`, `kv`, `postgres`).
    pub backend_override: Option<String>,
    /// Maximum database connections in the pool.
    pub db_max_connections: u32,
    /// HMAC key for preview signatures and signed blob URLs.
    pub preview_key: String,
    /// HMAC key for capability-scope derivation.
    pub scope_key: String,
    /// Preview TTL in seconds; clamped by the preview service.
    pub preview_ttl_seconds: Option<u64>,
    /// Private-route cache TTL in seconds.
    pub private_cache_ttl_seconds: u64,
    /// Event bus channel capacity.
    pub event_bus_capacity: usize,
    /// Log level (e.g., "info", "debug", "trace").
    pub log_level: String,
}

impl AppConfig {
    /// Load configuration from environment variables with sensible
    /// defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3030".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid u16"))?,
            database_url: env::var("DATABASE_URL").ok(),
            backend_override: env::var("PRESSROOM_BACKEND").ok(),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            preview_key: env::var("PREVIEW_KEY")
                .unwrap_or_else(|_| "dev-preview-key-change-me".to_string()),
            scope_key: env::var("SCOPE_KEY")
                .unwrap_or_else(|_| "dev-scope-key-change-me".to_string()),
            preview_ttl_seconds: env::var("PREVIEW_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok()),
            private_cache_ttl_seconds: env::var("PRIVATE_CACHE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            event_bus_capacity: env::var("EVENT_BUS_CAPACITY")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("EVENT_BUS_CAPACITY must be a valid usize"))?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Pick the storage backend once at startup: an explicit override
    /// wins, otherwise presence of `DATABASE_URL` selects PostgreSQL
    /// and its absence the in-memory backend.
    pub fn backend(&self) -> anyhow::Result<Backend> {
        match self.backend_override.as_deref() {
            Some("memory") => Ok(Backend::Memory),
            Some("kv") => Ok(Backend::Kv),
            Some("postgres") => Ok(Backend::Postgres),
            Some(other) => Err(anyhow::anyhow!("unknown backend {other:?}")),
            None if self.database_url.is_some() => Ok(Backend::Postgres),
            None => Ok(Backend::Memory),
        }
    }

    /// Build the socket address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
