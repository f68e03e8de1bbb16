//! Session issuance and frame routing between bound Controller/Cardhost pairs.
//!
//! `SessionRelay` owns `RelaySession` and `SessionToken` exclusively;
//! connection objects live in the transport layer's [`ConnectionTable`]
//! and are referenced here only by key, never by pointer, so the two
//! sides can never form an ownership cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use relay_protocol::{Frame, RelayError};
use tokio::sync::mpsc;

use crate::registry::PeerRegistry;

pub type OutboundSender = mpsc::UnboundedSender<Frame>;

/// One live duplex endpoint, keyed by session token (Controller side) or
/// peer id (Cardhost side). At most one entry per key; inserting over an
/// existing one displaces it.
#[derive(Default)]
pub struct ConnectionTable {
    inner: Mutex<HashMap<String, OutboundSender>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `sender` under `key`, returning the displaced sender (if
    /// any) so the caller can close it *outside* this table's lock.
    pub fn insert(&self, key: &str, sender: OutboundSender) -> Option<OutboundSender> {
        self.inner.lock().insert(key.to_string(), sender)
    }

    pub fn remove(&self, key: &str) -> Option<OutboundSender> {
        self.inner.lock().remove(key)
    }

    pub fn get(&self, key: &str) -> Option<OutboundSender> {
        self.inner.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }
}

#[derive(Debug, Clone)]
struct StoredSession {
    token: String,
    controller_id: String,
    cardhost_uuid: String,
    expires_at: DateTime<Utc>,
    last_activity: Instant,
    /// Set once a Controller actually opens the duplex socket for this
    /// token — a bare token from `create_session` isn't a relay session
    /// yet, just a pending bind.
    relay_id: Option<String>,
    /// Set when either bound endpoint's connection closes. Cleared on
    /// reconnect. The grace-period sweep only removes a session once
    /// this has been set for longer than `T_grace`, giving a dropped
    /// peer a window to reconnect without losing its bind.
    disconnected_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    by_token: HashMap<String, StoredSession>,
}

pub struct SessionRelay {
    inner: Mutex<Inner>,
    controllers: Arc<PeerRegistry>,
    cardhosts: Arc<PeerRegistry>,
    connections: ConnectionTable,
    session_ttl: Duration,
}

impl SessionRelay {
    pub fn new(controllers: Arc<PeerRegistry>, cardhosts: Arc<PeerRegistry>, session_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            controllers,
            cardhosts,
            connections: ConnectionTable::new(),
            session_ttl,
        }
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Issue a session token binding `controller_id` to `cardhost_uuid`.
    ///
    /// Caller must acquire the relevant `PeerRegistry` lock ordering
    /// (Controller before Cardhost, neither before this relay's own
    /// lock) by simply calling the registry methods below — they're
    /// each independently locked and released before this lock is taken.
    pub fn create_session(&self, controller_id: &str, cardhost_uuid: &str) -> Result<(String, DateTime<Utc>), RelayError> {
        if !self.controllers.is_authenticated(controller_id) {
            return Err(RelayError::NotAuthenticated);
        }
        if !self.cardhosts.is_connected(cardhost_uuid) {
            return Err(RelayError::CardhostOffline);
        }

        let token = random_token();
        let expires_at = Utc::now() + self.session_ttl;
        self.inner.lock().by_token.insert(
            token.clone(),
            StoredSession {
                token: token.clone(),
                controller_id: controller_id.to_string(),
                cardhost_uuid: cardhost_uuid.to_string(),
                expires_at,
                last_activity: Instant::now(),
                relay_id: None,
                disconnected_at: None,
            },
        );
        Ok((token, expires_at))
    }

    /// Validates a token presented when a Controller opens its duplex
    /// socket, returning the Cardhost it's bound to. Registers the
    /// connection under the token, displacing any prior one (the
    /// displaced sender is returned for the caller to close outside
    /// any lock).
    pub fn open_relay(&self, token: &str, sender: OutboundSender) -> Result<(String, Option<OutboundSender>), RelayError> {
        let cardhost_uuid = {
            let mut inner = self.inner.lock();
            let session = inner.by_token.get_mut(token).ok_or(RelayError::InvalidToken)?;
            if Utc::now() > session.expires_at {
                inner.by_token.remove(token);
                return Err(RelayError::InvalidToken);
            }
            session.last_activity = Instant::now();
            session.relay_id.get_or_insert_with(|| uuid::Uuid::new_v4().to_string());
            session.disconnected_at = None;
            session.cardhost_uuid.clone()
        };
        let displaced = self.connections.insert(token, sender);
        Ok((cardhost_uuid, displaced))
    }

    /// Registers a Cardhost's duplex connection under its peer id,
    /// displacing any prior one.
    pub fn register_cardhost_conn(&self, cardhost_uuid: &str, sender: OutboundSender) -> Option<OutboundSender> {
        let mut inner = self.inner.lock();
        for session in inner.by_token.values_mut().filter(|s| s.cardhost_uuid == cardhost_uuid) {
            session.disconnected_at = None;
        }
        drop(inner);
        self.connections.insert(cardhost_uuid, sender)
    }

    /// Mark every session bound to `key` (a session token for a
    /// Controller, a Cardhost uuid for a Cardhost) as disconnected as of
    /// now. The grace-period sweep will remove it if nothing reconnects
    /// within `T_grace`.
    pub fn note_disconnected(&self, key: &str) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        if let Some(session) = inner.by_token.get_mut(key) {
            session.disconnected_at = Some(now);
            return;
        }
        for session in inner.by_token.values_mut().filter(|s| s.cardhost_uuid == key) {
            session.disconnected_at = Some(now);
        }
    }

    /// Remove sessions that have been disconnected for longer than
    /// `grace_ttl` with no reconnect. Returns the count removed.
    pub fn sweep_grace(&self, grace_ttl: Duration) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.by_token.len();
        inner
            .by_token
            .retain(|_, s| s.disconnected_at.is_none_or(|at| at.elapsed() <= grace_ttl));
        before - inner.by_token.len()
    }

    /// Route a frame arriving on a Controller's socket (keyed by its
    /// session token) to the bound Cardhost. Returns an error frame to
    /// send back to the Controller if routing fails.
    pub fn route_from_controller(&self, token: &str, frame: &Frame) -> Result<(), Frame> {
        let cardhost_uuid = {
            let mut inner = self.inner.lock();
            let Some(session) = inner.by_token.get_mut(token) else {
                return Err(error_frame(frame, "NO_RELAY_SESSION", "no relay session for this token"));
            };
            session.last_activity = Instant::now();
            session.cardhost_uuid.clone()
        };

        match self.connections.get(&cardhost_uuid) {
            Some(sender) => sender
                .send(frame.clone())
                .map_err(|_| error_frame(frame, "CARDHOST_OFFLINE", "cardhost connection closed")),
            None => Err(error_frame(frame, "CARDHOST_OFFLINE", "cardhost is not connected")),
        }
    }

    /// Route a frame arriving on a Cardhost's socket to the Controller
    /// currently bound to it (assumes at most one bound Controller per
    /// Cardhost — see the module-level assumption).
    pub fn route_from_cardhost(&self, cardhost_uuid: &str, frame: &Frame) -> Option<()> {
        let token = {
            let mut inner = self.inner.lock();
            let session = inner
                .by_token
                .values_mut()
                .find(|s| s.cardhost_uuid == cardhost_uuid)?;
            session.last_activity = Instant::now();
            session.token.clone()
        };
        let sender = self.connections.get(&token)?;
        sender.send(frame.clone()).ok()
    }

    /// Remove sessions idle longer than `idle_ttl`. Returns the count removed.
    pub fn sweep_idle(&self, idle_ttl: Duration) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.by_token.len();
        inner.by_token.retain(|_, s| s.last_activity.elapsed() <= idle_ttl);
        before - inner.by_token.len()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().by_token.len()
    }
}

fn random_token() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn error_frame(source: &Frame, code: &str, message: &str) -> Frame {
    Frame::error(source.id.as_deref(), code, message)
}
