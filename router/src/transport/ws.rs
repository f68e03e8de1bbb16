//! Duplex-socket endpoints: `/ws/cardhost` and `/ws/controller`.
//!
//! One task owns the socket: it selects between inbound WebSocket frames
//! and an outbound `mpsc` channel, the same shape the reference server
//! uses for its bridged connections, minus the byte-stream bridge since
//! here the wire unit already is a `Frame`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use relay_protocol::Frame;
use tokio::sync::mpsc;

use crate::state::SharedState;

const CLOSE_PROTOCOL_ERROR: u16 = 1008;
const CLOSE_GOING_AWAY: u16 = 1001;
const CLOSE_RUNTIME_ERROR: u16 = 1011;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    use axum::extract::ws::CloseFrame;
    let _ = socket
        .send(WsMessage::Close(Some(CloseFrame { code, reason: reason.into() })))
        .await;
}

pub async fn cardhost_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_cardhost(socket, state, headers))
}

async fn handle_cardhost(mut socket: WebSocket, state: Arc<SharedState>, headers: HeaderMap) {
    let Some(uuid) = header(&headers, "x-cardhost-uuid") else {
        close_with(&mut socket, CLOSE_PROTOCOL_ERROR, "missing x-cardhost-uuid").await;
        return;
    };
    if !state.cardhosts.is_authenticated(&uuid) {
        close_with(&mut socket, CLOSE_PROTOCOL_ERROR, "cardhost has not completed verify").await;
        return;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    if let Some(displaced) = state.relay.register_cardhost_conn(&uuid, tx) {
        drop(displaced); // dropping the sender closes the old task's write side
    }

    let heartbeat_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);
    let shutdown = state.shutdown.subscribe();
    run_socket(socket, rx, heartbeat_timeout, shutdown, {
        let state = state.clone();
        let uuid = uuid.clone();
        move |frame| {
            let state = state.clone();
            let uuid = uuid.clone();
            async move {
                state.relay.route_from_cardhost(&uuid, &frame);
            }
        }
    })
    .await;

    state.cardhosts.set_connected(&uuid, false);
    state.relay.connections().remove(&uuid);
    state.relay.note_disconnected(&uuid);
}

pub async fn controller_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_controller(socket, state, headers))
}

async fn handle_controller(mut socket: WebSocket, state: Arc<SharedState>, headers: HeaderMap) {
    let (Some(_controller_id), Some(token)) = (
        header(&headers, "x-controller-id"),
        header(&headers, "x-session-token"),
    ) else {
        close_with(&mut socket, CLOSE_PROTOCOL_ERROR, "missing auth headers").await;
        return;
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let cardhost_uuid = match state.relay.open_relay(&token, tx) {
        Ok((cardhost_uuid, displaced)) => {
            drop(displaced);
            cardhost_uuid
        }
        Err(_) => {
            close_with(&mut socket, CLOSE_PROTOCOL_ERROR, "invalid or expired session token").await;
            return;
        }
    };

    let heartbeat_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);
    let shutdown = state.shutdown.subscribe();
    run_socket(socket, rx, heartbeat_timeout, shutdown, {
        let state = state.clone();
        let token = token.clone();
        move |frame| {
            let state = state.clone();
            let token = token.clone();
            async move {
                if let Err(err_frame) = state.relay.route_from_controller(&token, &frame) {
                    if let Some(sender) = state.relay.connections().get(&token) {
                        let _ = sender.send(err_frame);
                    }
                }
            }
        }
    })
    .await;

    state.relay.connections().remove(&token);
    state.relay.note_disconnected(&token);
    let _ = cardhost_uuid;
}

/// Drive one duplex socket until it closes: forward inbound frames to
/// `on_frame`, write whatever arrives on `rx` back out, close the socket
/// with 1011 if no inbound traffic (of any frame type, including
/// `heartbeat`) arrives within `heartbeat_timeout`, and close with 1001
/// the moment the process-wide `shutdown` broadcast fires.
async fn run_socket<F, Fut>(
    mut socket: WebSocket,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    heartbeat_timeout: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
    on_frame: F,
) where
    F: Fn(Frame) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut last_inbound = Instant::now();

    loop {
        let since_last = Instant::now().saturating_duration_since(last_inbound);
        let remaining = heartbeat_timeout.saturating_sub(since_last);

        tokio::select! {
            _ = shutdown.recv() => {
                close_with(&mut socket, CLOSE_GOING_AWAY, "router shutting down").await;
                return;
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        last_inbound = Instant::now();
                        match Frame::from_json(&text) {
                            Ok(frame) => on_frame(frame).await,
                            Err(e) => tracing::debug!("dropping malformed frame: {e}"),
                        }
                    }
                    Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {
                        last_inbound = Instant::now();
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            outgoing = rx.recv() => {
                match outgoing {
                    Some(frame) => {
                        let Ok(json) = frame.to_json() else { continue };
                        if socket.send(WsMessage::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::time::sleep(remaining) => {
                tracing::warn!(?heartbeat_timeout, "closing socket: no inbound traffic within heartbeat timeout");
                close_with(&mut socket, CLOSE_RUNTIME_ERROR, "heartbeat timeout").await;
                return;
            }
        }
    }
    let _ = socket.send(WsMessage::Close(None)).await;
}
