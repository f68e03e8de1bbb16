//! Auth + session-bind + relay client for the Controller side: register,
//! authenticate, request a session against a specific Cardhost, then
//! drive a duplex socket to send `apdu.command` frames and await
//! `apdu.response` frames.

use std::collections::HashMap;
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relay_protocol::apdu::{ApduCommand, ApduCommandWire, ApduResponse};
use relay_protocol::{keys, Frame};
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::ControllerError;

const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Deserialize)]
struct InitiateResponse {
    #[serde(rename = "controllerId")]
    controller_id: String,
    challenge: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    token: String,
}

/// Authenticates against `router_url` and returns the `controllerId`.
pub async fn authenticate(http: &reqwest::Client, router_url: &str, signing_key: &SigningKey, public_key: &str) -> Result<String, ControllerError> {
    let initiate: InitiateResponse = http
        .post(format!("{router_url}/controller/auth/initiate"))
        .json(&serde_json::json!({ "publicKey": public_key }))
        .send()
        .await
        .map_err(|e| ControllerError::Router(e.to_string()))?
        .json()
        .await
        .map_err(|e| ControllerError::Router(e.to_string()))?;

    let signature = keys::sign_challenge(signing_key, &initiate.challenge);
    let status = http
        .post(format!("{router_url}/controller/auth/verify"))
        .json(&serde_json::json!({
            "controllerId": initiate.controller_id,
            "challenge": initiate.challenge,
            "signature": signature,
        }))
        .send()
        .await
        .map_err(|e| ControllerError::Router(e.to_string()))?
        .status();
    if !status.is_success() {
        return Err(ControllerError::Router(format!("verify rejected: {status}")));
    }

    Ok(initiate.controller_id)
}

/// Requests a session token binding `controller_id` to `cardhost_uuid`.
pub async fn create_session(http: &reqwest::Client, router_url: &str, controller_id: &str, cardhost_uuid: &str) -> Result<String, ControllerError> {
    let resp = http
        .post(format!("{router_url}/controller/sessions"))
        .json(&serde_json::json!({ "controllerId": controller_id, "cardhostUuid": cardhost_uuid }))
        .send()
        .await
        .map_err(|e| ControllerError::Router(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(ControllerError::Router(format!("session creation rejected: {}", resp.status())));
    }
    let session: SessionResponse = resp.json().await.map_err(|e| ControllerError::Router(e.to_string()))?;
    Ok(session.token)
}

type PendingReplies = Arc<Mutex<HashMap<String, oneshot::Sender<ApduResponse>>>>;

/// A live relay connection: send APDU commands, await their responses
/// matched by the frame `id` the relay preserves on the way back.
pub struct RelayHandle {
    outbound: tokio::sync::mpsc::UnboundedSender<Frame>,
    pending: PendingReplies,
    next_id: std::sync::atomic::AtomicU64,
}

impl RelayHandle {
    pub async fn send_apdu(&self, command: &ApduCommand) -> Result<ApduResponse, ControllerError> {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);

        let payload = serde_json::to_value(ApduCommandWire { hex: command.to_hex() }).unwrap();
        let mut frame = Frame::new(relay_protocol::frame::TYPE_APDU_COMMAND, payload);
        frame.id = Some(id.clone());

        self.outbound.send(frame).map_err(|_| ControllerError::Router("relay connection closed".to_string()))?;

        rx.await.map_err(|_| ControllerError::Router("relay closed before a response arrived".to_string()))
    }
}

/// Opens `/ws/controller` with the given token, spawns the read/write
/// pump, and returns a handle for issuing APDUs.
pub async fn open_relay(router_url: &str, controller_id: &str, token: &str) -> Result<RelayHandle, ControllerError> {
    let ws_url = router_url.replacen("http", "ws", 1);
    let request = tokio_tungstenite::tungstenite::http::Request::builder()
        .uri(format!("{ws_url}/ws/controller"))
        .header("x-controller-id", controller_id)
        .header("x-session-token", token)
        .header("Host", host_of(&ws_url))
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", tokio_tungstenite::tungstenite::handshake::client::generate_key())
        .body(())
        .map_err(|e| ControllerError::Router(e.to_string()))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await.map_err(ControllerError::WebSocket)?;
    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::unbounded_channel::<Frame>();
    let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
    let pending_for_task = pending.clone();

    tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // first tick fires immediately
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let json = Frame::heartbeat().to_json().expect("Frame serialization is infallible");
                    if write.send(WsMessage::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                outgoing = outbound_rx.recv() => {
                    match outgoing {
                        Some(frame) => {
                            let json = frame.to_json().expect("Frame serialization is infallible");
                            if write.send(WsMessage::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(WsMessage::Text(text))) => {
                            let Ok(frame) = Frame::from_json(&text) else {
                                tracing::debug!("dropping malformed frame");
                                continue;
                            };
                            if frame.frame_type == relay_protocol::frame::TYPE_APDU_RESPONSE {
                                if let Some(id) = frame.id.clone() {
                                    if let Ok(response) = serde_json::from_value::<ApduResponse>(frame.payload) {
                                        if let Some(sender) = pending_for_task.lock().remove(&id) {
                                            let _ = sender.send(response);
                                        }
                                    }
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(_)) => break,
                    }
                }
            }
        }
    });

    Ok(RelayHandle { outbound: outbound_tx, pending, next_id: std::sync::atomic::AtomicU64::new(0) })
}

fn host_of(ws_url: &str) -> String {
    ws_url
        .trim_start_matches("wss://")
        .trim_start_matches("ws://")
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
