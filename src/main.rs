//! crashpoint server binary.

use clap::Parser;
use crashpoint::api::{AppState, GameServer};
use crashpoint::config::CrashConfig;
use crashpoint::feed::{FeedPublisher, SessionRegistry};
use crashpoint::game::engine::RoundEngine;
use crashpoint::store::MemoryStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crashpoint")]
#[command(about = "Crash-game round engine and socket bridge", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address override
    #[arg(long)]
    host: Option<String>,

    /// Bind port override
    #[arg(long)]
    port: Option<u16>,

    /// Betting countdown override in seconds
    #[arg(long)]
    betting_window: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => CrashConfig::load(path)?,
        None => CrashConfig::default(),
    };
    if let Some(host) = args.host {
        config.server.bind_address = host;
    }
    if let Some(port) = args.port {
        config.server.bind_port = port;
    }
    if let Some(window) = args.betting_window {
        config.game.betting_window_secs = window;
    }
    config.validate()?;

    info!(
        tick_ms = config.game.tick_interval_ms,
        betting_window_secs = config.game.betting_window_secs,
        "starting round engine"
    );

    let store = Arc::new(MemoryStore::new());
    let feed = FeedPublisher::new(config.game.feed_buffer);
    let sessions = SessionRegistry::new();
    let engine = RoundEngine::spawn(
        config.game.clone(),
        store,
        feed.clone(),
        sessions.clone(),
    );

    let state = Arc::new(AppState {
        engine,
        feed,
        sessions,
    });
    GameServer::new(config.server, state).run().await
}
