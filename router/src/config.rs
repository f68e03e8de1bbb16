//! Router configuration.
//!
//! Every field doubles as a CLI flag and an environment variable, the
//! same pattern the reference server uses for its listen address and
//! log-format toggle.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "router", about = "Card relay Router: authenticates Controllers and Cardhosts, forwards APDU frames between them")]
pub struct RouterConfig {
    /// Address the REST + WebSocket front-end binds to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port the REST + WebSocket front-end binds to.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Emit structured JSON logs instead of human-readable ones.
    #[arg(long, env = "ROUTER_LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Challenge lifetime, in seconds.
    #[arg(long, env = "ROUTER_CHALLENGE_TTL_SECS", default_value_t = 300)]
    pub challenge_ttl_secs: u64,

    /// Session token lifetime, in seconds.
    #[arg(long, env = "ROUTER_SESSION_TTL_SECS", default_value_t = 86_400)]
    pub session_ttl_secs: u64,

    /// How long an idle relay session survives before the sweeper kills it.
    #[arg(long, env = "ROUTER_RELAY_IDLE_SECS", default_value_t = 1800)]
    pub relay_idle_secs: u64,

    /// Grace period after either endpoint disconnects before the relay
    /// session is garbage-collected, to allow a quick reconnect.
    #[arg(long, env = "ROUTER_RELAY_GRACE_SECS", default_value_t = 30)]
    pub relay_grace_secs: u64,

    /// Interval between idle-relay sweeps.
    #[arg(long, env = "ROUTER_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    /// Seconds of silence on a duplex socket before the Router closes it.
    #[arg(long, env = "ROUTER_HEARTBEAT_TIMEOUT_SECS", default_value_t = 90)]
    pub heartbeat_timeout_secs: u64,
}

impl RouterConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_json: false,
            challenge_ttl_secs: 300,
            session_ttl_secs: 86_400,
            relay_idle_secs: 1800,
            relay_grace_secs: 30,
            sweep_interval_secs: 60,
            heartbeat_timeout_secs: 90,
        }
    }
}
