//! WebSocket transport for the real-time channel
//!
//! The token is verified before the upgrade; an unauthenticated request is
//! answered with 401 and never reaches the channel router. Each connection runs
//! three tasks:
//! - a writer draining the hub's outbound queue into the socket
//! - a reader forwarding text frames to the connection's worker
//! - a worker handling frames strictly in receive order
//!
//! The worker is detached: frames already received are still processed (and
//! their writes completed) after the socket closes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use ptk_common::events::ServerEvent;
use ptk_common::model::Identity;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::auth::{authenticate_request, TokenQuery};
use super::ApiError;
use crate::handlers::{self, Session};
use crate::AppState;

/// GET /ws: WebSocket upgrade
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError> {
    let identity = authenticate_request(&state, &headers, &query).await?;
    let ws = ws.ok_or_else(|| ApiError::BadRequest("Expected a WebSocket upgrade".to_string()))?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, identity))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let (mut sink, mut stream) = socket.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let connection = state.hub.register(identity.clone(), out_tx).await;
    let session = Session::new(connection, identity);

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    {
        let state = state.clone();
        let session = session.clone();
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                handlers::handle_frame(&state, &session, &frame).await;
            }
            debug!(connection = session.connection, "Frame worker finished");
        });
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(event = event.event_name(), "Failed to encode event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) => {
                    if frame_tx.send(text.to_string()).is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.unregister(connection).await;
}

pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}
