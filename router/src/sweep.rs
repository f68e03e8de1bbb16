//! Periodic cleanup tasks: expired challenges and idle relay sessions.
//!
//! Both run on the same interval timer rather than one each — a single
//! sweep tick doing two unrelated jobs is cheaper than juggling two
//! timers for work this infrequent.

use std::sync::Arc;
use std::time::Duration;

use crate::state::SharedState;

pub async fn run(state: Arc<SharedState>) {
    let interval = Duration::from_secs(state.config.sweep_interval_secs);
    let challenge_ttl = Duration::from_secs(state.config.challenge_ttl_secs);
    let relay_idle = Duration::from_secs(state.config.relay_idle_secs);
    let relay_grace = Duration::from_secs(state.config.relay_grace_secs);
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let expired_controller = state.controllers.cleanup_expired_challenges(challenge_ttl);
        let expired_cardhost = state.cardhosts.cleanup_expired_challenges(challenge_ttl);
        let grace_expired = state.relay.sweep_grace(relay_grace);
        let idle_sessions = state.relay.sweep_idle(relay_idle);

        if expired_controller + expired_cardhost + grace_expired + idle_sessions > 0 {
            tracing::debug!(
                expired_controller,
                expired_cardhost,
                grace_expired,
                idle_sessions,
                "sweep removed stale state"
            );
        }
    }
}
