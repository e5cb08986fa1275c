//! WebSocket upgrade handler
//!
//! Presentation clients are read-only: every connection gets the current
//! scoreboard on connect and the live event stream after that. No client
//! message changes match state; mutations go through the HTTP surface.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::ws::protocol::MatchEvent;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New scoreboard client connected");

    // Subscribe before snapshotting so no event between the two is lost
    let mut events = state.match_handle.subscribe();

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Seed the client with the current state
    match state.match_handle.scoreboard().await {
        Ok(view) => {
            if let Err(e) = send_event(&mut ws_sink, &MatchEvent::Scoreboard { view }).await {
                debug!(error = %e, "Failed to send initial scoreboard");
                return;
            }
        }
        Err(e) => {
            warn!(error = %e, "Scoreboard snapshot unavailable for new client");
            return;
        }
    }

    // Writer task: match events -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = send_event(&mut ws_sink, &event).await {
                        debug!(error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // The next scoreboard event restores a consistent view
                    warn!(lagged_count = n, "Client lagged, skipping {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: only connection lifecycle matters
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Close(_)) => {
                info!("Client initiated close");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!("Keepalive frame");
            }
            Ok(_) => {
                debug!("Ignoring inbound client message");
            }
            Err(e) => {
                debug!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
    info!("Scoreboard client disconnected");
}

/// Send one event over WebSocket
async fn send_event(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    event: &MatchEvent,
) -> Result<(), String> {
    let json = serde_json::to_string(event).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
