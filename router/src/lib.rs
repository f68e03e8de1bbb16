//! Router core: authenticates Controllers and Cardhosts and relays APDU
//! frames between them. See [`state::SharedState`] for how the pieces
//! (two [`registry::PeerRegistry`] instances, two [`auth::AuthService`]
//! instances, and one [`relay::SessionRelay`]) fit together.

pub mod auth;
pub mod config;
pub mod registry;
pub mod relay;
pub mod state;
pub mod sweep;
pub mod transport;

pub use config::RouterConfig;
pub use state::SharedState;
