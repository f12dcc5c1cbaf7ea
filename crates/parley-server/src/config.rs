//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP/WebSocket (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database.
    /// Env: `DB_PATH`
    /// Default: the platform data directory (see `parley_store::Database::new`).
    pub db_path: Option<PathBuf>,

    /// Page size used when a listing request does not specify a limit.
    /// Env: `PAGE_LIMIT`
    /// Default: `10`
    pub default_page_limit: usize,

    /// Seconds between idle conversation-lock purges.
    /// Env: `LOCK_PURGE_INTERVAL_SECS`
    /// Default: `300`
    pub lock_purge_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            db_path: None,
            default_page_limit: 10,
            lock_purge_interval_secs: 300,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(val) = std::env::var("PAGE_LIMIT") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.default_page_limit = n,
                _ => tracing::warn!(value = %val, "Invalid PAGE_LIMIT, using default"),
            }
        }

        if let Ok(val) = std::env::var("LOCK_PURGE_INTERVAL_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.lock_purge_interval_secs = n.max(1);
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
