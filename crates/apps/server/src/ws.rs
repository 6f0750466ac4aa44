//! WebSocket map sessions.
//!
//! Each connection owns one `MapSession`:
//! - client JSON messages become session commands
//! - session outputs are pushed back as `ServerMessage`s
//! - the connection's user location lives in a `SharedLocation`

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use streaming::{
    ClientMessage, FacilitySource, MapSession, ServerMessage, SessionConfig, SessionHandle,
    SharedLocation,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Handle a WebSocket connection for one map screen.
pub async fn handle_ws_connection(
    socket: WebSocket,
    source: Arc<dyn FacilitySource>,
    config: SessionConfig,
) {
    let session_id = Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let location = SharedLocation::default();
    let (handle, mut outputs) = MapSession::spawn(source, Arc::new(location.clone()), config);

    // Channel for everything the socket writes
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(256);

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if let Err(e) = ws_tx.send(Message::Text(text)).await {
                warn!("Failed to send message: {e}");
                break;
            }
        }
    });

    let hello = ServerMessage::Hello {
        session_id: session_id.clone(),
        server_version: env!("CARGO_PKG_VERSION").to_string(),
        capabilities: vec![
            "viewport_aggregation".to_string(),
            "clustering".to_string(),
            "selection".to_string(),
        ],
    };
    if out_tx.send(hello).await.is_err() {
        error!("Failed to queue hello for {session_id}");
        return;
    }
    info!("WS session {session_id} connected");

    let forward_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(output) = outputs.recv().await {
            if forward_tx.send(ServerMessage::from(output)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!("WS receive error: {e}");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if !handle_client_text(&text, &handle, &location, &out_tx).await {
                    break;
                }
            }
            Message::Binary(_) => {
                let _ = out_tx
                    .send(ServerMessage::error("unsupported", "binary frames are not supported"))
                    .await;
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => {
                info!("WS session {session_id} closed by client");
                break;
            }
        }
    }

    handle.shutdown().await;
    let _ = forwarder.await;
    drop(out_tx);
    let _ = sender_task.await;
    info!("WS session {session_id} disconnected");
}

/// Returns `false` once the session is gone.
async fn handle_client_text(
    text: &str,
    handle: &SessionHandle,
    location: &SharedLocation,
    out: &mpsc::Sender<ServerMessage>,
) -> bool {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            let _ = out.send(ServerMessage::error("parse_error", e.to_string())).await;
            return true;
        }
    };

    if let ClientMessage::Ping { seq } = msg {
        let _ = out.send(ServerMessage::Pong { seq }).await;
        return true;
    }

    if matches!(msg, ClientMessage::UserLocation { .. }) {
        match msg.user_location() {
            Ok(loc) => {
                if !location.set(loc) {
                    debug!("user location unchanged");
                    return true;
                }
            }
            Err(e) => {
                let _ = out.send(ServerMessage::error("invalid_message", e.to_string())).await;
                return true;
            }
        }
    }

    match msg.into_command() {
        Ok(Some(command)) => handle.send(command).await.is_ok(),
        Ok(None) => true,
        Err(e) => {
            let _ = out.send(ServerMessage::error("invalid_message", e.to_string())).await;
            true
        }
    }
}
