//! Main entry point for the coordination demo server.
//!
//! This binary hosts an in-memory shared store, runs a few simulated
//! participants against it and serves the registry over HTTP using the Axum
//! web framework.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tab_coordinator::server::{AppState, create_router};
use tab_coordinator::{CoordinatorConfig, MemoryStore, SystemClock};

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_PARTICIPANTS: usize = 3;

fn load_config() -> Result<CoordinatorConfig, Box<dyn std::error::Error>> {
    match std::env::var("COORDINATOR_CONFIG") {
        Ok(path) => {
            info!("Loading configuration from {}", path);
            let json = std::fs::read_to_string(&path)?;
            Ok(CoordinatorConfig::from_json(&json)?)
        }
        Err(_) => Ok(CoordinatorConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting tab coordinator demo server...");

    let config = load_config()?;
    config.validate()?;

    let addr: SocketAddr = std::env::var("COORDINATOR_BIND")
        .unwrap_or_else(|_| DEFAULT_BIND.to_string())
        .parse()?;
    let participants = match std::env::var("COORDINATOR_PARTICIPANTS") {
        Ok(raw) => raw.parse()?,
        Err(_) => DEFAULT_PARTICIPANTS,
    };

    let state = AppState::new(MemoryStore::new(), config, Arc::new(SystemClock));
    for _ in 0..participants {
        let view = state.spawn_participant().await?;
        info!("Participant {} holds id {:?}", view.key, view.id);
    }

    let app = create_router().with_state(state.clone());

    info!("Server listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /health        - Health check");
    info!("  GET  /registry      - Current participant registry");
    info!("  GET  /participants  - Participants hosted by this server");
    info!("  POST /participants  - Start another participant");
    info!("  GET  /ws            - Stream of store changes");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Shutting down, removing participants from the registry");
    state.shutdown().await;
    Ok(())
}
