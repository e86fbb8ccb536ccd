//! Route handlers for the coordination demo server.
//!
//! This module contains the HTTP route handlers and the shared application
//! state for the Axum server.

use axum::{
    Router,
    extract::{State, ws::WebSocketUpgrade},
    http::StatusCode,
    response::{Json, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::config::CoordinatorConfig;
use crate::coordination::{Clock, CoordinatorState, Participant, ParticipantId, Registry, RegistryStore};
use crate::error::Result;
use crate::server::websocket::handle_websocket_connection;
use crate::store::{MemoryEphemeralStore, MemoryStore};

/// A participant simulated inside the server process.
pub type LocalParticipant = Participant<MemoryStore, MemoryEphemeralStore>;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Public view of a simulated participant
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ParticipantView {
    pub key: String,
    pub id: Option<ParticipantId>,
    pub state: CoordinatorState,
}

impl From<&LocalParticipant> for ParticipantView {
    fn from(participant: &LocalParticipant) -> Self {
        ParticipantView {
            key: participant.key().to_string(),
            id: participant.assigned_id(),
            state: participant.state(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: MemoryStore,
    pub config: CoordinatorConfig,
    pub clock: Arc<dyn Clock>,
    participants: Arc<RwLock<Vec<LocalParticipant>>>,
}

impl AppState {
    pub fn new(store: MemoryStore, config: CoordinatorConfig, clock: Arc<dyn Clock>) -> Self {
        AppState {
            store,
            config,
            clock,
            participants: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Starts another participant with its own store handle and its own
    /// ephemeral store, as a separate process would have.
    pub async fn spawn_participant(&self) -> Result<ParticipantView> {
        let participant = Participant::start(
            Arc::new(self.store.handle()),
            Arc::new(MemoryEphemeralStore::new()),
            Arc::clone(&self.clock),
            self.config.clone(),
        )
        .await?;
        let view = ParticipantView::from(&participant);
        self.participants.write().await.push(participant);
        Ok(view)
    }

    pub async fn participants(&self) -> Vec<ParticipantView> {
        self.participants
            .read()
            .await
            .iter()
            .map(ParticipantView::from)
            .collect()
    }

    /// Reads the registry as currently stored.
    pub fn registry(&self) -> Result<Registry> {
        RegistryStore::new(Arc::new(self.store.handle()), self.config.registry_key.clone()).read()
    }

    /// Stops every simulated participant, removing their registry entries.
    pub async fn shutdown(&self) {
        let participants: Vec<_> = self.participants.write().await.drain(..).collect();
        for participant in participants {
            let key = participant.key().clone();
            if let Err(e) = participant.stop().await {
                error!(participant = %key, error = %e, "failed to stop participant");
            }
        }
    }
}

type ApiError = (StatusCode, String);

fn internal_error(e: crate::error::CoordinatorError) -> ApiError {
    error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Basic health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Coordinator is running!".to_string(),
    })
}

/// Current registry contents
pub async fn registry(State(state): State<AppState>) -> std::result::Result<Json<Registry>, ApiError> {
    state.registry().map(Json).map_err(internal_error)
}

/// Participants running in this server
pub async fn list_participants(State(state): State<AppState>) -> Json<Vec<ParticipantView>> {
    Json(state.participants().await)
}

/// Starts one more simulated participant
pub async fn create_participant(
    State(state): State<AppState>,
) -> std::result::Result<(StatusCode, Json<ParticipantView>), ApiError> {
    let view = state.spawn_participant().await.map_err(internal_error)?;
    info!(participant = %view.key, id = ?view.id, "participant started via api");
    Ok((StatusCode::CREATED, Json(view)))
}

/// WebSocket endpoint streaming registry changes
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket_connection(socket, state))
}

/// Creates and configures the main application router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/registry", get(registry))
        .route("/participants", get(list_participants).post(create_participant))
        .route("/ws", get(ws_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::SystemClock;

    #[tokio::test]
    async fn test_spawned_participants_get_distinct_ids() {
        let state = AppState::new(
            MemoryStore::new(),
            CoordinatorConfig::default(),
            Arc::new(SystemClock),
        );

        let first = state.spawn_participant().await.unwrap();
        let second = state.spawn_participant().await.unwrap();
        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));
        assert_eq!(first.state, CoordinatorState::Active);

        let registry = state.registry().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(state.participants().await.len(), 2);

        state.shutdown().await;
        assert!(state.registry().unwrap().is_empty());
        assert!(state.participants().await.is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let Json(response) = health().await;
        assert_eq!(response.status, "ok");
    }
}
