//! HTTP + WebSocket front-end: wires [`rest`] and [`ws`] handlers onto an axum `Router`.

pub mod rest;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::SharedState;

pub fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/cardhost/connect", post(rest::cardhost_connect))
        .route("/cardhost/verify", post(rest::cardhost_verify))
        .route("/controller/auth/initiate", post(rest::controller_initiate))
        .route("/controller/auth/verify", post(rest::controller_verify))
        .route("/controller/sessions", post(rest::create_session))
        .route("/controller/cardhosts", get(rest::list_cardhosts))
        .route("/stats", get(rest::stats))
        .route("/health", get(rest::health))
        .route("/ws/cardhost", get(ws::cardhost_ws))
        .route("/ws/controller", get(ws::controller_ws))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
