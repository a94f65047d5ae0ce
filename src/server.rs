use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::{self, AppState, SharedState};
use crate::db::{DbHandle, InventoryDb};

/// Runtime settings for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Relaxes CORS so a separately served frontend can talk to the API
    /// during development.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8000,
            db_path: PathBuf::from("partsbin.db"),
            dev_mode: false,
        }
    }
}

pub fn build_router(state: SharedState, dev_mode: bool) -> Router {
    let mut app = api::api_router().with_state(state);
    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = InventoryDb::new(&config.db_path)
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
    let state = Arc::new(AppState {
        db: DbHandle::new(db),
    });
    let app = build_router(state, config.dev_mode);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!(%addr, db = %config.db_path.display(), "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
