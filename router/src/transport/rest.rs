//! REST endpoints: auth handshake, session issuance, and read-only status.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use relay_protocol::RelayError;
use serde::{Deserialize, Serialize};

use crate::state::SharedState;

fn status_for(err: &RelayError) -> StatusCode {
    use relay_protocol::error::ErrorCategory::*;
    match err.category() {
        Input => StatusCode::BAD_REQUEST,
        Auth => StatusCode::UNAUTHORIZED,
        State => match err {
            RelayError::CardhostOffline => StatusCode::NOT_FOUND,
            _ => StatusCode::CONFLICT,
        },
        Runtime => StatusCode::INTERNAL_SERVER_ERROR,
        Transient => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(err: RelayError) -> (StatusCode, Json<ErrorBody>) {
    let status = status_for(&err);
    (status, Json(ErrorBody { code: err.code(), message: err.to_string() }))
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Deserialize)]
pub struct ConnectRequest {
    #[serde(rename = "publicKey")]
    public_key: String,
}

#[derive(Serialize)]
pub struct ConnectResponse {
    uuid: String,
    challenge: String,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    uuid: String,
    challenge: String,
    signature: String,
}

#[derive(Deserialize)]
pub struct ControllerVerifyRequest {
    #[serde(rename = "controllerId")]
    controller_id: String,
    challenge: String,
    signature: String,
}

#[derive(Serialize)]
pub struct OkResponse {
    ok: bool,
}

#[derive(Serialize)]
pub struct ControllerVerifyResponse {
    ok: bool,
    #[serde(rename = "controllerId")]
    controller_id: String,
}

pub async fn cardhost_connect(
    State(state): State<Arc<SharedState>>,
    Json(req): Json<ConnectRequest>,
) -> impl IntoResponse {
    match state.cardhost_auth.initiate(&req.public_key) {
        Ok((uuid, challenge)) => (StatusCode::CREATED, Json(ConnectResponse { uuid, challenge })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// Unlike every other auth-adjacent endpoint, `/cardhost/verify` does not
/// route through [`status_for`]: the REST table reserves 401 for a bad
/// signature specifically and puts every other `AuthService::verify`
/// failure (unregistered, id/key mismatch, stale or missing challenge)
/// at 400, since those all indicate a malformed or spoofed request rather
/// than a rejected credential.
pub async fn cardhost_verify(
    State(state): State<Arc<SharedState>>,
    Json(req): Json<VerifyRequest>,
) -> impl IntoResponse {
    match state.cardhost_auth.verify(&req.uuid, &req.challenge, &req.signature) {
        Ok(true) => (StatusCode::OK, Json(OkResponse { ok: true })).into_response(),
        Ok(false) => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody { code: RelayError::SignatureInvalid.code(), message: RelayError::SignatureInvalid.to_string() }),
        )
            .into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ErrorBody { code: e.code(), message: e.to_string() })).into_response(),
    }
}

pub async fn controller_initiate(
    State(state): State<Arc<SharedState>>,
    Json(req): Json<ConnectRequest>,
) -> impl IntoResponse {
    match state.controller_auth.initiate(&req.public_key) {
        Ok((controller_id, challenge)) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "controllerId": controller_id, "challenge": challenge })),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn controller_verify(
    State(state): State<Arc<SharedState>>,
    Json(req): Json<ControllerVerifyRequest>,
) -> impl IntoResponse {
    match state
        .controller_auth
        .verify(&req.controller_id, &req.challenge, &req.signature)
    {
        Ok(true) => (
            StatusCode::OK,
            Json(ControllerVerifyResponse { ok: true, controller_id: req.controller_id }),
        )
            .into_response(),
        Ok(false) => error_response(RelayError::SignatureInvalid).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    #[serde(rename = "controllerId")]
    controller_id: String,
    #[serde(rename = "cardhostUuid")]
    cardhost_uuid: String,
}

#[derive(Serialize)]
pub struct CreateSessionResponse {
    token: String,
    #[serde(rename = "expiresAt")]
    expires_at: chrono::DateTime<chrono::Utc>,
}

pub async fn create_session(
    State(state): State<Arc<SharedState>>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    match state.relay.create_session(&req.controller_id, &req.cardhost_uuid) {
        Ok((token, expires_at)) => (StatusCode::CREATED, Json(CreateSessionResponse { token, expires_at })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Serialize)]
pub struct CardhostSummary {
    uuid: String,
    connected: bool,
}

pub async fn list_cardhosts(State(state): State<Arc<SharedState>>, headers: HeaderMap) -> impl IntoResponse {
    let Some(controller_id) = headers.get("x-controller-id").and_then(|v| v.to_str().ok()) else {
        return error_response(RelayError::NotAuthenticated).into_response();
    };
    if !state.controllers.is_authenticated(controller_id) {
        return error_response(RelayError::NotAuthenticated).into_response();
    }

    let list: Vec<CardhostSummary> = state
        .cardhosts
        .list_all()
        .into_iter()
        .map(|r| CardhostSummary { uuid: r.id, connected: r.connected })
        .collect();
    Json(list).into_response()
}

#[derive(Serialize)]
pub struct StatsResponse {
    controllers: usize,
    cardhosts: usize,
    sessions: usize,
}

pub async fn stats(State(state): State<Arc<SharedState>>) -> impl IntoResponse {
    Json(StatsResponse {
        controllers: state.controllers.count(),
        cardhosts: state.cardhosts.count(),
        sessions: state.relay.session_count(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    ok: bool,
    running: bool,
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { ok: true, running: true })
}
