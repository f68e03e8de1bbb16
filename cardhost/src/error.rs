use thiserror::Error;

#[derive(Debug, Error)]
pub enum CardhostError {
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[source] serde_json::Error),
    #[error("relay protocol error: {0}")]
    Relay(#[from] relay_protocol::RelayError),
    #[error("router rejected the connection: {0}")]
    Router(String),
    #[error("the router returned an id that doesn't match our own key — possible MITM: expected {expected}, got {got}")]
    IdentityMismatch { expected: String, got: String },
    #[error("websocket error: {0}")]
    WebSocket(#[source] tokio_tungstenite::tungstenite::Error),
}
