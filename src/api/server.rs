//! Socket bridge server setup.

use super::ws::ws_handler;
use crate::config::ServerConfig;
use crate::feed::{FeedPublisher, SessionRegistry};
use crate::game::engine::EngineHandle;
use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Shared state handed to every connection handler.
pub struct AppState {
    pub engine: EngineHandle,
    pub feed: FeedPublisher,
    pub sessions: SessionRegistry,
}

/// Build the router: health probe plus the WebSocket endpoint.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|origin| origin == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(%origin, "skipping unparseable CORS origin");
                    None
                }
            })
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    }
}

pub struct GameServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl GameServer {
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Serve until ctrl-c, then stop the engine, draining in-flight
    /// settlement writes first.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let router = create_router(self.state.clone())
            .layer(cors_layer(&self.config.allowed_origins))
            .layer(TraceLayer::new_for_http());

        let address = format!("{}:{}", self.config.bind_address, self.config.bind_port);
        let listener = tokio::net::TcpListener::bind(&address).await?;
        info!(%address, "socket bridge listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = signal::ctrl_c().await;
                info!("shutdown signal received");
            })
            .await?;

        self.state.engine.shutdown().await?;
        Ok(())
    }
}
