//! REST-surface acceptance tests driven through the axum `Router`
//! directly via `tower::ServiceExt::oneshot` — no live socket needed.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::pkcs8::EncodePublicKey;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use relay_protocol::keys::sign_challenge;
use router::{transport, RouterConfig, SharedState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> axum::Router {
    let state = SharedState::new(RouterConfig::default());
    transport::router(state)
}

fn fresh_keypair() -> (SigningKey, String) {
    let key = SigningKey::generate(&mut OsRng);
    let der = key.verifying_key().to_public_key_der().unwrap();
    (key, STANDARD.encode(der.as_bytes()))
}

async fn post_json(app: &axum::Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

async fn get(app: &axum::Router, path: &str, header: Option<(&str, &str)>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some((name, value)) = header {
        builder = builder.header(name, value);
    }
    let request = builder.body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

#[tokio::test]
async fn health_and_stats_are_reachable_unauthenticated() {
    let app = app();
    let (status, body) = get(&app, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, body) = get(&app, "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["controllers"], 0);
}

#[tokio::test]
async fn cardhost_connect_then_verify_round_trips() {
    let app = app();
    let (key, pk) = fresh_keypair();

    let (status, body) = post_json(&app, "/cardhost/connect", json!({ "publicKey": pk })).await;
    assert_eq!(status, StatusCode::CREATED);
    let uuid = body["uuid"].as_str().unwrap().to_string();
    let challenge = body["challenge"].as_str().unwrap().to_string();
    assert!(uuid.starts_with("peer_"));

    let signature = sign_challenge(&key, &challenge);
    let (status, body) = post_json(
        &app,
        "/cardhost/verify",
        json!({ "uuid": uuid, "challenge": challenge, "signature": signature }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn cardhost_verify_with_bad_signature_is_unauthorized() {
    let app = app();
    let (_key, pk) = fresh_keypair();
    let (_status, body) = post_json(&app, "/cardhost/connect", json!({ "publicKey": pk })).await;
    let uuid = body["uuid"].as_str().unwrap();
    let challenge = body["challenge"].as_str().unwrap();

    let (status, body) = post_json(
        &app,
        "/cardhost/verify",
        json!({ "uuid": uuid, "challenge": challenge, "signature": "bm90LWEtc2lnbmF0dXJl" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "SIGNATURE_INVALID");
}

#[tokio::test]
async fn cardhost_verify_with_spoofed_uuid_is_bad_request() {
    let state = SharedState::new(RouterConfig::default());
    // A record whose stored key doesn't derive to its own id — the shape
    // a forged uuid claiming someone else's registration would have.
    state.cardhosts.register("peer_AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", "not-the-real-key");
    let app = transport::router(state);

    let (status, body) = post_json(
        &app,
        "/cardhost/verify",
        json!({
            "uuid": "peer_AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            "challenge": "irrelevant",
            "signature": "irrelevant",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ID_KEY_MISMATCH");
}

#[tokio::test]
async fn session_creation_requires_authenticated_controller_and_online_cardhost() {
    let app = app();
    let (controller_key, controller_pk) = fresh_keypair();
    let (cardhost_key, cardhost_pk) = fresh_keypair();

    let (_status, body) = post_json(&app, "/controller/auth/initiate", json!({ "publicKey": controller_pk })).await;
    let controller_id = body["controllerId"].as_str().unwrap().to_string();
    let challenge = body["challenge"].as_str().unwrap().to_string();

    let (_status, body) = post_json(&app, "/cardhost/connect", json!({ "publicKey": cardhost_pk })).await;
    let cardhost_uuid = body["uuid"].as_str().unwrap().to_string();
    let cardhost_challenge = body["challenge"].as_str().unwrap().to_string();

    // Not authenticated yet: session creation must be rejected.
    let (status, _body) = post_json(
        &app,
        "/controller/sessions",
        json!({ "controllerId": controller_id, "cardhostUuid": cardhost_uuid }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let sig = sign_challenge(&controller_key, &challenge);
    let (status, _body) = post_json(
        &app,
        "/controller/auth/verify",
        json!({ "controllerId": controller_id, "challenge": challenge, "signature": sig }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Authenticated, but the cardhost hasn't completed verify (not connected) yet.
    let (status, _body) = post_json(
        &app,
        "/controller/sessions",
        json!({ "controllerId": controller_id, "cardhostUuid": cardhost_uuid }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let host_sig = sign_challenge(&cardhost_key, &cardhost_challenge);
    post_json(
        &app,
        "/cardhost/verify",
        json!({ "uuid": cardhost_uuid, "challenge": cardhost_challenge, "signature": host_sig }),
    )
    .await;

    let (status, body) = post_json(
        &app,
        "/controller/sessions",
        json!({ "controllerId": controller_id, "cardhostUuid": cardhost_uuid }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["token"].as_str().unwrap().len() >= 16);

    let (status, body) = get(&app, "/controller/cardhosts", Some(("x-controller-id", &controller_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["uuid"], cardhost_uuid);
    assert_eq!(body[0]["connected"], true);
}

#[tokio::test]
async fn listing_cardhosts_without_header_is_unauthorized() {
    let app = app();
    let (status, _body) = get(&app, "/controller/cardhosts", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
