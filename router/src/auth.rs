//! Challenge/response handshake service — one instance per peer class.
//!
//! `initiate` registers the peer and issues a fresh challenge;
//! `verify` checks id/key binding, freshness, then the signature,
//! in that order.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use relay_protocol::{identity, signature, RelayError};

use crate::registry::PeerRegistry;

const CHALLENGE_BYTES: usize = 32;

pub struct AuthService {
    registry: Arc<PeerRegistry>,
    challenge_ttl: Duration,
}

impl AuthService {
    pub fn new(registry: Arc<PeerRegistry>, challenge_ttl: Duration) -> Self {
        Self { registry, challenge_ttl }
    }

    /// Step 1: derive the id, register (idempotently), issue a fresh
    /// challenge. Returns `(peer_id, challenge)`.
    pub fn initiate(&self, public_key: &str) -> Result<(String, String), RelayError> {
        let peer_id = identity::derive_peer_id(public_key)?;
        self.registry.register(&peer_id, public_key);
        let challenge = random_challenge();
        self.registry.store_challenge(&peer_id, challenge.clone());
        Ok((peer_id, challenge))
    }

    /// Step 2: verify the peer's response to its outstanding challenge.
    ///
    /// Returns `Ok(true)` / `Ok(false)` for a structurally valid
    /// request where the signature did or didn't check out — `Ok(false)`
    /// does NOT consume the challenge, so the caller may retry within
    /// the TTL. An `Err` means the request couldn't even be evaluated
    /// (no such peer, no challenge, challenge expired/mismatched).
    pub fn verify(&self, peer_id: &str, challenge: &str, sig_b64: &str) -> Result<bool, RelayError> {
        let record = self.registry.get(peer_id).ok_or(RelayError::NotRegistered)?;

        if !identity::verify_peer_id(peer_id, &record.public_key) {
            return Err(RelayError::IdKeyMismatch);
        }

        let (stored_challenge, age) =
            self.registry.get_challenge(peer_id).ok_or(RelayError::NoChallenge)?;

        if age > self.challenge_ttl {
            self.registry.remove_challenge(peer_id);
            return Err(RelayError::ChallengeExpired);
        }

        if stored_challenge != challenge {
            return Err(RelayError::ChallengeMismatch);
        }

        let ok = signature::verify(challenge, &record.public_key, sig_b64);
        if !ok {
            // Non-destructive: the challenge survives for a retry.
            return Ok(false);
        }

        self.registry.set_connected(peer_id, true);
        self.registry.remove_challenge(peer_id);
        Ok(true)
    }
}

fn random_challenge() -> String {
    let mut bytes = [0u8; CHALLENGE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::pkcs8::EncodePublicKey;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use relay_protocol::keys::sign_challenge;

    fn fresh_keypair() -> (SigningKey, String) {
        let key = SigningKey::generate(&mut OsRng);
        let der = key.verifying_key().to_public_key_der().unwrap();
        (key, STANDARD.encode(der.as_bytes()))
    }

    fn service() -> AuthService {
        AuthService::new(Arc::new(PeerRegistry::new()), Duration::from_secs(300))
    }

    #[test]
    fn happy_path_round_trip() {
        let (key, pk) = fresh_keypair();
        let svc = service();
        let (peer_id, challenge) = svc.initiate(&pk).unwrap();
        assert_eq!(peer_id, identity::derive_peer_id(&pk).unwrap());

        let sig = sign_challenge(&key, &challenge);
        assert!(svc.verify(&peer_id, &challenge, &sig).unwrap());
    }

    #[test]
    fn spoofed_id_is_rejected() {
        let (key, pk) = fresh_keypair();
        let svc = service();
        let (_peer_id, challenge) = svc.initiate(&pk).unwrap();
        let sig = sign_challenge(&key, &challenge);

        let err = svc.verify("peer_AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", &challenge, &sig);
        assert_eq!(err, Err(RelayError::NotRegistered));
    }

    #[test]
    fn expired_challenge_is_removed_on_verify() {
        let (_key, pk) = fresh_keypair();
        let svc = AuthService::new(Arc::new(PeerRegistry::new()), Duration::from_millis(0));
        let (peer_id, challenge) = svc.initiate(&pk).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let err = svc.verify(&peer_id, &challenge, "irrelevant");
        assert_eq!(err, Err(RelayError::ChallengeExpired));
        assert_eq!(svc.verify(&peer_id, &challenge, "irrelevant"), Err(RelayError::NoChallenge));
    }

    #[test]
    fn replay_of_used_challenge_fails_with_no_challenge() {
        let (key, pk) = fresh_keypair();
        let svc = service();
        let (peer_id, challenge) = svc.initiate(&pk).unwrap();
        let sig = sign_challenge(&key, &challenge);
        assert!(svc.verify(&peer_id, &challenge, &sig).unwrap());
        assert_eq!(svc.verify(&peer_id, &challenge, &sig), Err(RelayError::NoChallenge));
    }

    #[test]
    fn tampered_signature_does_not_consume_challenge() {
        let (key, pk) = fresh_keypair();
        let svc = service();
        let (peer_id, challenge) = svc.initiate(&pk).unwrap();
        let good_sig = sign_challenge(&key, &challenge);
        let mut sig_bytes = STANDARD.decode(&good_sig).unwrap();
        sig_bytes[0] ^= 0xFF;
        let bad_sig = STANDARD.encode(sig_bytes);

        assert_eq!(svc.verify(&peer_id, &challenge, &bad_sig), Ok(false));
        // Challenge still there — a retry with the right signature should work.
        assert_eq!(svc.verify(&peer_id, &challenge, &good_sig), Ok(true));
    }
}
