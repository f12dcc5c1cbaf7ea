//! # parley-server
//!
//! HTTP + WebSocket front end for the Parley conversation & presence
//! synchronization engine.
//!
//! This binary provides:
//! - **REST API** (axum) for sending messages, conversation listings, and
//!   history reads
//! - **WebSocket push channel** delivering `receiveMessage` and presence
//!   events to connected clients
//! - **SQLite-backed message ledger** with an anchored last-message pointer
//!   per conversation
//!
//! Account lifecycle, friend CRUD, and media upload are external services;
//! this server consumes their data read-only.

mod api;
mod config;
mod error;
mod ws;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_engine::Engine;
use parley_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting Parley server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the database and build the engine
    // -----------------------------------------------------------------------
    let database = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    let db = Arc::new(Mutex::new(database));
    let engine = Arc::new(Engine::new(db));

    let app_state = AppState {
        engine: engine.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic purge of idle per-conversation lock entries.
    let purge_engine = engine.clone();
    let purge_interval = config.lock_purge_interval_secs;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(purge_interval));
        loop {
            interval.tick().await;
            let kept = purge_engine.purge_idle_locks().await;
            tracing::debug!(kept, "purged idle conversation locks");
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP/WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the HTTP server or a shutdown
    // signal arrives, we exit cleanly.
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
