//! Statistics web server

use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::config::UiConfig;
use crate::session::StreamSession;
use crate::ui::handlers;

/// Shared handler state
pub struct AppState {
    pub session: Arc<StreamSession>,
    pub started_at: DateTime<Utc>,
    pub udp_port: u16,
    pub recording: bool,
}

/// Read-only HTTP view of a running session
pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: UiConfig, session: Arc<StreamSession>, udp_port: u16, recording: bool) -> Self {
        Self {
            config,
            state: Arc::new(AppState {
                session,
                started_at: Utc::now(),
                udp_port,
                recording,
            }),
        }
    }

    /// Build the API router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(handlers::get_status))
            .route("/api/stats", get(handlers::get_stats))
            .route("/api/stats/reset", post(handlers::reset_stats))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.http_port)
    }

    /// Serve until the process exits
    pub async fn run(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr()).await?;
        tracing::info!("Statistics API available at http://{}", listener.local_addr()?);
        axum::serve(listener, self.router()).await
    }

    /// Spawn on the current tokio runtime
    pub fn start_background(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("Web server error: {}", e);
            }
        })
    }
}
