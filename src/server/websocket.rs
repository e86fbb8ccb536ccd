//! WebSocket sessions streaming store changes to clients.
//!
//! Each session first receives a snapshot of the registry, then one message
//! per mutation of the shared store.

use axum::extract::ws::{Message, WebSocket};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::coordination::Registry;
use crate::server::routes::AppState;
use crate::store::{SharedStore, StoreEvent, Subscription};

/// Messages sent to watching clients
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WatchMessage {
    Snapshot {
        registry: Registry,
    },
    Change {
        key: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
}

impl From<StoreEvent> for WatchMessage {
    fn from(event: StoreEvent) -> Self {
        WatchMessage::Change {
            key: event.key,
            old_value: event.old_value,
            new_value: event.new_value,
        }
    }
}

/// WebSocket watch session
pub struct WatchSession {
    socket: WebSocket,
    subscription: Subscription,
    state: AppState,
    session_id: String,
}

impl WatchSession {
    /// Create a new session. The subscription is taken here, before the
    /// snapshot is read, so no change falls between the two.
    pub fn new(socket: WebSocket, state: AppState, session_id: String) -> Self {
        let subscription = state.store.handle().subscribe();
        Self {
            socket,
            subscription,
            state,
            session_id,
        }
    }

    /// Handle the WebSocket connection lifecycle
    pub async fn handle(mut self) {
        info!("Watch session {} established", self.session_id);

        if let Err(e) = self.send_snapshot().await {
            error!("Failed to send snapshot to {}: {}", self.session_id, e);
            return;
        }

        loop {
            tokio::select! {
                msg = self.socket.recv() => match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Watch session {} closed by client", self.session_id);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = self.socket.send(Message::Pong(data)).await {
                            error!("Failed to send pong to {}: {}", self.session_id, e);
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        // Clients only listen; ignore anything they send.
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", self.session_id, e);
                        break;
                    }
                },
                event = self.subscription.recv() => match event {
                    Some(event) => {
                        if let Err(e) = send_message(&mut self.socket, &WatchMessage::from(event)).await {
                            error!("Failed to forward change to {}: {}", self.session_id, e);
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        info!("Watch session {} ended", self.session_id);
    }

    async fn send_snapshot(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let registry = self.state.registry()?;
        send_message(&mut self.socket, &WatchMessage::Snapshot { registry }).await
    }
}

async fn send_message(
    socket: &mut WebSocket,
    message: &WatchMessage,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let json = serde_json::to_string(message)?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}

/// Generate a unique session ID
pub fn generate_session_id() -> String {
    format!("watch_{}", chrono::Utc::now().timestamp_millis())
}

/// Create and handle a new watch session
pub async fn handle_websocket_connection(socket: WebSocket, state: AppState) {
    let session_id = generate_session_id();
    let session = WatchSession::new(socket, state, session_id);
    session.handle().await;
}
