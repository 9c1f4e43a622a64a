//! WebSocket upgrade handler: one connection per admitted player

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::AppError;
use crate::relay::{Outbound, Relay};
use crate::session::SessionError;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, PlayerId, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub session_id: Option<Uuid>,
    pub player_id: Option<PlayerId>,
    pub token: Option<Uuid>,
}

/// Attach an admitted player to their session's relay
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let (Some(session_id), Some(player_id)) = (query.session_id, query.player_id) else {
        return Err(SessionError::MissingIdentity.into());
    };

    let handle = state
        .sessions
        .authorized(session_id, player_id, query.token)
        .map_err(|e| {
            warn!(session_id = %session_id, player_id = %player_id, error = %e, "WebSocket rejected");
            e
        })?;

    info!(session_id = %session_id, player_id = %player_id, "WebSocket upgrade");
    let relay = handle.relay.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, player_id, relay)))
}

async fn handle_socket(socket: WebSocket, player_id: PlayerId, relay: Relay) {
    let session_id = relay.session_id();
    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before the welcome so nothing published in between is missed
    let outbound_rx = relay.subscribe();

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        return;
    }

    run_connection(player_id, &relay, ws_sink, ws_stream, outbound_rx).await;

    // A dropped socket counts as leaving; the record stays for reconnect
    if relay.submit(player_id, ClientMsg::Leave).await.is_err() {
        debug!(player_id = %player_id, "Host already stopped");
    }

    info!(session_id = %session_id, player_id = %player_id, "WebSocket connection closed");
}

/// Pump relay output to the socket and socket input to the relay
async fn run_connection(
    player_id: PlayerId,
    relay: &Relay,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbound_rx: broadcast::Receiver<Outbound>,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    let writer_handle = tokio::spawn(async move {
        loop {
            match outbound_rx.recv().await {
                Ok(outbound) => {
                    if !outbound.is_for(&player_id) {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut ws_sink, &outbound.msg).await {
                        debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        player_id = %player_id,
                        lagged_count = n,
                        "Client lagged, skipping {} messages", n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(player_id = %player_id, "Relay closed");
                    break;
                }
            }
        }
    });

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited relay message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    // Leaving is signalled once, when the socket closes
                    Ok(ClientMsg::Leave) => break,
                    // Joins are only admitted through the session API
                    Ok(ClientMsg::JoinRequest { .. }) => {
                        warn!(player_id = %player_id, "Join over socket ignored");
                    }
                    Ok(client_msg) => {
                        if relay.submit(player_id, client_msg).await.is_err() {
                            debug!(player_id = %player_id, "Relay inbound closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
