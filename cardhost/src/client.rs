//! Auth + relay client loop: connect to a Router, authenticate, open the
//! duplex socket, and dispatch inbound APDU frames to a
//! [`crate::platform::SmartCardPlatform`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use relay_protocol::apdu::{ApduCommand, ApduCommandWire};
use relay_protocol::{keys, Frame};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::config::Identity;
use crate::error::CardhostError;
use crate::platform::SmartCardPlatform;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct ConnectResponse {
    uuid: String,
    challenge: String,
}

/// Runs the auth + relay loop forever, reconnecting with exponential
/// backoff on any transport failure. Returns only on a fatal identity
/// mismatch (possible MITM) — every other failure is retried.
pub async fn run(identity: Identity, router_url: String, platform: Arc<dyn SmartCardPlatform>) -> Result<(), CardhostError> {
    let signing_key = keys::signing_key_from_raw_b64(&identity.private_key)?;
    let http = reqwest::Client::new();
    let mut attempt: u32 = 0;

    loop {
        match run_once(&http, &router_url, &identity, &signing_key, platform.clone()).await {
            Ok(()) => attempt = 0,
            Err(CardhostError::IdentityMismatch { expected, got }) => {
                tracing::error!(expected, got, "router-returned id doesn't match our key, aborting");
                return Err(CardhostError::IdentityMismatch { expected, got });
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "connection to router failed");
            }
        }

        let delay = backoff_delay(attempt);
        tracing::info!(?delay, "reconnecting");
        tokio::time::sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32 << attempt.min(5));
    let capped = exp.min(BACKOFF_CAP);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 4 + 1);
    capped + Duration::from_millis(jitter_ms)
}

async fn run_once(
    http: &reqwest::Client,
    router_url: &str,
    identity: &Identity,
    signing_key: &ed25519_dalek::SigningKey,
    platform: Arc<dyn SmartCardPlatform>,
) -> Result<(), CardhostError> {
    let connect: ConnectResponse = http
        .post(format!("{router_url}/cardhost/connect"))
        .json(&serde_json::json!({ "publicKey": identity.public_key }))
        .send()
        .await
        .map_err(|e| CardhostError::Router(e.to_string()))?
        .json()
        .await
        .map_err(|e| CardhostError::Router(e.to_string()))?;

    if connect.uuid != identity.uuid {
        return Err(CardhostError::IdentityMismatch { expected: identity.uuid.clone(), got: connect.uuid });
    }

    let signature = keys::sign_challenge(signing_key, &connect.challenge);
    let verify_status = http
        .post(format!("{router_url}/cardhost/verify"))
        .json(&serde_json::json!({
            "uuid": connect.uuid,
            "challenge": connect.challenge,
            "signature": signature,
        }))
        .send()
        .await
        .map_err(|e| CardhostError::Router(e.to_string()))?
        .status();
    if !verify_status.is_success() {
        return Err(CardhostError::Router(format!("verify rejected: {verify_status}")));
    }

    let ws_url = router_url.replacen("http", "ws", 1);
    let request = tokio_tungstenite::tungstenite::http::Request::builder()
        .uri(format!("{ws_url}/ws/cardhost"))
        .header("x-cardhost-uuid", &identity.uuid)
        .header("Host", host_of(&ws_url))
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", tokio_tungstenite::tungstenite::handshake::client::generate_key())
        .body(())
        .map_err(|e| CardhostError::Router(e.to_string()))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(CardhostError::WebSocket)?;
    tracing::info!(uuid = %identity.uuid, "cardhost connected and authenticated");

    let (mut write, mut read) = ws_stream.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            message = read.next() => {
                let Some(message) = message else { break };
                let message = message.map_err(CardhostError::WebSocket)?;
                let WsMessage::Text(text) = message else { continue };
                let Ok(frame) = Frame::from_json(&text) else {
                    tracing::debug!("dropping malformed frame");
                    continue;
                };
                if frame.frame_type == relay_protocol::frame::TYPE_APDU_COMMAND {
                    let response_frame = handle_apdu_command(&frame, platform.as_ref());
                    let json = response_frame.to_json().expect("Frame serialization is infallible");
                    write.send(WsMessage::Text(json.into())).await.map_err(CardhostError::WebSocket)?;
                }
            }
            _ = heartbeat.tick() => {
                let json = Frame::heartbeat().to_json().expect("Frame serialization is infallible");
                write.send(WsMessage::Text(json.into())).await.map_err(CardhostError::WebSocket)?;
            }
        }
    }

    Ok(())
}

fn handle_apdu_command(frame: &Frame, platform: &dyn SmartCardPlatform) -> Frame {
    let command = serde_json::from_value::<ApduCommandWire>(frame.payload.clone())
        .ok()
        .and_then(|wire| ApduCommand::from_hex(&wire.hex).ok());
    let response = match command {
        Some(command) => platform.transmit(&command),
        None => relay_protocol::apdu::ApduResponse::with_sw(&[], 0x6A80), // incorrect parameters
    };

    let mut out = Frame::new(relay_protocol::frame::TYPE_APDU_RESPONSE, serde_json::to_value(response).unwrap());
    out.id = frame.id.clone();
    out.seq = frame.seq;
    out
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockSmartCardPlatform;

    #[test]
    fn handle_apdu_command_preserves_id_and_seq() {
        let mut frame = Frame::new(
            relay_protocol::frame::TYPE_APDU_COMMAND,
            serde_json::json!({ "hex": "00a4040008a000000003000000" }),
        );
        frame.id = Some("req-1".to_string());
        frame.seq = Some(7);

        let response = handle_apdu_command(&frame, &MockSmartCardPlatform::new());
        assert_eq!(response.frame_type, relay_protocol::frame::TYPE_APDU_RESPONSE);
        assert_eq!(response.id.as_deref(), Some("req-1"));
        assert_eq!(response.seq, Some(7));
        assert_eq!(response.payload["sw"], "9000");
    }

    #[test]
    fn malformed_hex_yields_wrong_parameters_status() {
        let frame = Frame::new(relay_protocol::frame::TYPE_APDU_COMMAND, serde_json::json!({ "hex": "zz" }));
        let response = handle_apdu_command(&frame, &MockSmartCardPlatform::new());
        assert_eq!(response.payload["sw"], "6A80");
    }

    #[test]
    fn backoff_delay_stays_within_cap_plus_jitter() {
        for attempt in 0..10 {
            let delay = backoff_delay(attempt);
            assert!(delay <= BACKOFF_CAP + Duration::from_millis(BACKOFF_CAP.as_millis() as u64 / 4 + 1));
            assert!(delay >= BACKOFF_BASE.min(BACKOFF_CAP));
        }
    }
}
