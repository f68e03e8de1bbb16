use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),
    #[error("relay protocol error: {0}")]
    Relay(#[from] relay_protocol::RelayError),
    #[error("router rejected the request: {0}")]
    Router(String),
    #[error("websocket error: {0}")]
    WebSocket(#[source] tokio_tungstenite::tungstenite::Error),
}
