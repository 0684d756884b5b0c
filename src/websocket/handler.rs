use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::{AuthRejection, AuthenticatedIdentity};
use crate::connections::ConnectionHandle;
use crate::metrics::{
    WsMessageMetrics, AUTH_REJECTED_TOTAL, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED,
    WS_CONNECTION_DURATION,
};
use crate::server::AppState;

use super::message::{ClientMessage, OutboundMessage, ServerMessage};

/// Close code for failed handshake authentication, distinguishable from a
/// normal close (1000) by client reconnect logic.
pub const UNAUTHORIZED_CLOSE_CODE: u16 = 4401;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    // Extract token from Authorization header or query parameter
    let token = match extract_token(&headers, &query) {
        Some(t) => t,
        None => return reject_handshake(ws, AuthRejection::MissingToken),
    };

    let identity = match state.token_validator.validate(&token).await {
        Ok(identity) => identity,
        Err(rejection) => {
            tracing::warn!(reason = %rejection, "WebSocket authentication failed");
            return reject_handshake(ws, rejection);
        }
    };

    tracing::info!(
        user_id = %identity.user_id,
        tenant_id = %identity.tenant_id,
        "WebSocket upgrade requested"
    );

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Extract token from Authorization header or query parameter.
/// The header wins when both are present; the query parameter exists for
/// clients whose WebSocket API cannot set arbitrary headers.
fn extract_token(headers: &HeaderMap, query: &WsQuery) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    query.token.clone()
}

/// Complete the upgrade, then close immediately with the unauthorized
/// close code. The client never sees an acknowledgement and the
/// connection never touches the registry.
fn reject_handshake(ws: WebSocketUpgrade, rejection: AuthRejection) -> Response {
    AUTH_REJECTED_TOTAL.inc();
    ws.on_upgrade(move |mut socket| async move {
        tracing::debug!(reason = %rejection, "Closing unauthorized connection");
        let frame = CloseFrame {
            code: UNAUTHORIZED_CLOSE_CODE,
            reason: "unauthorized".into(),
        };
        let _ = socket.send(Message::Close(Some(frame))).await;
    })
}

/// Handle an established, authenticated WebSocket connection
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, identity),
    fields(
        user_id = %identity.user_id,
        tenant_id = %identity.tenant_id
    )
)]
async fn handle_socket(socket: WebSocket, state: AppState, identity: AuthenticatedIdentity) {
    let connection_start = std::time::Instant::now();

    // Channel for messages bound for this connection's socket
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(state.settings.websocket.outbound_buffer);
    let handle = Arc::new(ConnectionHandle::new(identity, tx));
    let connection_id = handle.id;

    // Queue the acknowledgement before the handle becomes visible to
    // broadcasts, so it is always the first frame the client reads.
    if handle
        .send(ServerMessage::connection_established(&handle.tenant_name))
        .await
        .is_err()
    {
        return;
    }

    if let Err(e) = state.registry.register(handle.clone()) {
        tracing::error!(connection_id = %connection_id, error = %e, "Connection rejected by registry");
        return;
    }

    WS_CONNECTIONS_OPENED.inc();

    tracing::info!(
        connection_id = %connection_id,
        user_id = %handle.user_id,
        tenant_id = %handle.tenant_id,
        "WebSocket connection established"
    );

    // Split socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for writing outbound messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize outbound message");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        // Channel closed (unregistered or shutting down): say goodbye
        let _ = ws_sender.close().await;
    });

    // Task for reading inbound frames
    let handle_recv = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &handle_recv).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Either half finishing, or a server-side close (idle sweep,
    // shutdown drain), tears the connection down
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
        _ = handle.closed() => {
            tracing::debug!(connection_id = %connection_id, "Connection closed by server");
        }
    }

    // In-flight work on the other half is abandoned, not error-reported
    send_task.abort();
    recv_task.abort();

    // Idempotent: the idle sweeper may already have removed us
    state.registry.unregister(connection_id);

    WS_CONNECTIONS_CLOSED.inc();
    let duration = connection_start.elapsed().as_secs_f64();
    WS_CONNECTION_DURATION.observe(duration);

    tracing::info!(
        connection_id = %connection_id,
        user_id = %handle.user_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket frame.
/// Returns false if the connection should be closed.
async fn process_message(msg: Message, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();

            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Ping) => {
                    WsMessageMetrics::record_ping();
                    let _ = handle.send(ServerMessage::pong()).await;
                }
                Err(e) => {
                    // Unknown or malformed payloads keep the connection open
                    WsMessageMetrics::record_ignored();
                    tracing::debug!(
                        connection_id = %handle.id,
                        error = %e,
                        "Ignoring unrecognized client message"
                    );
                }
            }
            true
        }
        Message::Binary(_) => {
            WsMessageMetrics::record_ignored();
            true
        }
        Message::Ping(_) => {
            handle.update_activity();
            // Axum replies with a pong frame automatically
            true
        }
        Message::Pong(_) => {
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}
