//! drawboard — real-time shared drawing surface server.
//!
//! Clients connect over a websocket to a named room and exchange JSON
//! frames. Each room keeps one authoritative operation log with global
//! undo/redo and fans every change out to its participants.

pub mod config;
pub mod frame;
pub mod operation;
pub mod replica;
pub mod routes;
pub mod services;
pub mod state;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::{ConfigError, ServerConfig};
use crate::state::AppState;

/// Fatal errors before or while serving. The binary exits non-zero on any.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Bind the configured address and serve until the server stops.
///
/// # Errors
///
/// `Bind` if the address is unavailable (including already in use),
/// `Serve` if the accept loop fails.
pub async fn run(config: ServerConfig) -> Result<(), StartupError> {
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    serve(listener, config).await
}

/// Serve on an already bound listener.
///
/// # Errors
///
/// `Serve` if the local address cannot be read or the accept loop fails.
pub async fn serve(listener: TcpListener, config: ServerConfig) -> Result<(), StartupError> {
    let local = listener.local_addr().map_err(StartupError::Serve)?;
    let app = routes::app(AppState::new(config));
    info!(addr = %local, "drawboard listening");
    axum::serve(listener, app).await.map_err(StartupError::Serve)
}
