//! Peer registry: one instance per peer class (Controllers, Cardhosts).
//!
//! Owns `PeerRecord` and its in-flight `Challenge` exclusively — nothing
//! outside this module mutates them. Call `register` before any other
//! method for a given id; everything else is a no-op/`None` on an
//! unknown id.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// A peer's registration. Never deleted for the life of the Router —
/// re-initiating reuses the same record since the id is derived from
/// the key, not assigned.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub id: String,
    pub public_key: String,
    pub connected: bool,
    pub registered_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct StoredChallenge {
    challenge: String,
    issued_at: Instant,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, PeerRecord>,
    challenges: HashMap<String, StoredChallenge>,
}

/// Registry of peers of one class (Controller or Cardhost).
///
/// All mutation happens under a single lock. Readers get a cloned
/// snapshot, never a reference into the map.
pub struct PeerRegistry {
    inner: Mutex<Inner>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    /// Idempotent on `(id, public_key)`: preserves `registered_at` and
    /// any existing `connected` flag if the record already exists.
    pub fn register(&self, id: &str, public_key: &str) -> PeerRecord {
        let mut inner = self.inner.lock();
        let record = inner.records.entry(id.to_string()).or_insert_with(|| PeerRecord {
            id: id.to_string(),
            public_key: public_key.to_string(),
            connected: false,
            registered_at: Utc::now(),
            connected_at: None,
        });
        record.clone()
    }

    pub fn get(&self, id: &str) -> Option<PeerRecord> {
        self.inner.lock().records.get(id).cloned()
    }

    pub fn set_connected(&self, id: &str, connected: bool) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.records.get_mut(id) {
            record.connected = connected;
            record.connected_at = if connected { Some(Utc::now()) } else { None };
        }
    }

    /// Authenticated and "connected" are the same flag in this model:
    /// the per-peer state machine moves Authenticated -> Disconnected on
    /// the same boolean `PeerRecord.connected` tracks.
    pub fn is_authenticated(&self, id: &str) -> bool {
        self.is_connected(id)
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.inner.lock().records.get(id).map(|r| r.connected).unwrap_or(false)
    }

    /// Unconditionally overwrites any in-flight challenge for `id`.
    pub fn store_challenge(&self, id: &str, challenge: String) {
        self.inner.lock().challenges.insert(
            id.to_string(),
            StoredChallenge { challenge, issued_at: Instant::now() },
        );
    }

    /// Returns the stored challenge and its age, if any.
    pub fn get_challenge(&self, id: &str) -> Option<(String, Duration)> {
        self.inner
            .lock()
            .challenges
            .get(id)
            .map(|c| (c.challenge.clone(), c.issued_at.elapsed()))
    }

    pub fn remove_challenge(&self, id: &str) {
        self.inner.lock().challenges.remove(id);
    }

    /// Remove challenges older than `ttl`. Returns the count removed.
    pub fn cleanup_expired_challenges(&self, ttl: Duration) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.challenges.len();
        inner.challenges.retain(|_, c| c.issued_at.elapsed() <= ttl);
        before - inner.challenges.len()
    }

    pub fn list_all(&self) -> Vec<PeerRecord> {
        self.inner.lock().records.values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn connected_count(&self) -> usize {
        self.inner.lock().records.values().filter(|r| r.connected).count()
    }

    /// Find an existing registration by public key, for replays from the
    /// same peer that may have lost their id client-side.
    pub fn find_id_by_public_key(&self, public_key: &str) -> Option<String> {
        self.inner
            .lock()
            .records
            .values()
            .find(|r| r.public_key == public_key)
            .map(|r| r.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_and_preserves_connected() {
        let reg = PeerRegistry::new();
        reg.register("peer_a", "pk-a");
        reg.set_connected("peer_a", true);
        let record = reg.register("peer_a", "pk-a");
        assert!(record.connected, "re-initiate must not reset connected");
    }

    #[test]
    fn store_challenge_overwrites_in_flight_one() {
        let reg = PeerRegistry::new();
        reg.register("peer_a", "pk-a");
        reg.store_challenge("peer_a", "first".to_string());
        reg.store_challenge("peer_a", "second".to_string());
        let (challenge, _) = reg.get_challenge("peer_a").unwrap();
        assert_eq!(challenge, "second");
    }

    #[test]
    fn cleanup_counts_removed_entries() {
        let reg = PeerRegistry::new();
        reg.register("peer_a", "pk-a");
        reg.store_challenge("peer_a", "c".to_string());
        assert_eq!(reg.cleanup_expired_challenges(Duration::from_secs(0)), 1);
        assert!(reg.get_challenge("peer_a").is_none());
    }

    #[test]
    fn unknown_peer_operations_are_no_ops() {
        let reg = PeerRegistry::new();
        assert!(reg.get("nope").is_none());
        assert!(!reg.is_connected("nope"));
        reg.set_connected("nope", true); // must not panic
    }
}
