//! Process-wide shared state: two peer registries, two auth services
//! (Controllers and Cardhosts are distinct peer classes, never share an
//! id space), and the single `SessionRelay` that binds them.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthService;
use crate::config::RouterConfig;
use crate::registry::PeerRegistry;
use crate::relay::SessionRelay;

pub struct SharedState {
    pub config: RouterConfig,
    pub controllers: Arc<PeerRegistry>,
    pub cardhosts: Arc<PeerRegistry>,
    pub controller_auth: AuthService,
    pub cardhost_auth: AuthService,
    pub relay: SessionRelay,
    /// Fired once, at shutdown, to every live `/ws/*` socket task so each
    /// can send its own close-1001 frame before the process exits.
    pub shutdown: tokio::sync::broadcast::Sender<()>,
}

impl SharedState {
    pub fn new(config: RouterConfig) -> Arc<Self> {
        let challenge_ttl = Duration::from_secs(config.challenge_ttl_secs);
        let session_ttl = Duration::from_secs(config.session_ttl_secs);

        let controllers = Arc::new(PeerRegistry::new());
        let cardhosts = Arc::new(PeerRegistry::new());
        let controller_auth = AuthService::new(controllers.clone(), challenge_ttl);
        let cardhost_auth = AuthService::new(cardhosts.clone(), challenge_ttl);
        let relay = SessionRelay::new(controllers.clone(), cardhosts.clone(), session_ttl);
        let (shutdown, _) = tokio::sync::broadcast::channel(1);

        Arc::new(Self {
            config,
            controllers,
            cardhosts,
            controller_auth,
            cardhost_auth,
            relay,
            shutdown,
        })
    }
}
