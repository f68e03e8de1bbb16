//! Peer identity derivation.
//!
//! `PeerId` is not assigned by the Router — it is computed from the
//! peer's SPKI-encoded Ed25519 public key. This is the sole source of
//! truth for identity: a peer proves it owns an id by signing a
//! challenge with the key that id was derived from.
//!
//! TODO: migrating this to an RFC 4122 v5 UUID over the public key has
//! been floated upstream but isn't implemented here — every peer must
//! agree on one derivation, and base64url-SHA-256 is the one in use.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::RelayError;

const PEER_ID_PREFIX: &str = "peer_";

/// Derive a peer id from a standard-base64 SPKI public key.
pub fn derive_peer_id(spki_b64: &str) -> Result<String, RelayError> {
    let bytes = STANDARD.decode(spki_b64).map_err(|_| RelayError::MalformedKey)?;
    Ok(derive_peer_id_from_bytes(&bytes))
}

/// Derive a peer id directly from decoded SPKI bytes. Total and deterministic.
pub fn derive_peer_id_from_bytes(spki_bytes: &[u8]) -> String {
    let digest = Sha256::digest(spki_bytes);
    format!("{PEER_ID_PREFIX}{}", URL_SAFE_NO_PAD.encode(digest))
}

/// Verify that `id` is exactly `derive(public_key)`, in constant time.
///
/// Returns `false` (never an error) if `spki_b64` fails to decode — a
/// malformed key simply can't match any id.
pub fn verify_peer_id(id: &str, spki_b64: &str) -> bool {
    match derive_peer_id(spki_b64) {
        Ok(expected) => constant_time_eq(id.as_bytes(), expected.as_bytes()),
        Err(_) => false,
    }
}

/// Constant-time byte comparison. Peer ids are public, not secret, but
/// this keeps the comparison uniform with signature verification and
/// avoids giving a timing side-channel on key-derivation mismatches.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let key = STANDARD.encode(b"not-a-real-spki-key-but-32-bytes");
        assert_eq!(derive_peer_id(&key).unwrap(), derive_peer_id(&key).unwrap());
    }

    #[test]
    fn derivation_has_no_padding_and_has_prefix() {
        let key = STANDARD.encode([7u8; 44]);
        let id = derive_peer_id(&key).unwrap();
        assert!(id.starts_with(PEER_ID_PREFIX));
        assert!(!id.contains('='));
    }

    #[test]
    fn malformed_key_is_malformed_key_error() {
        assert_eq!(derive_peer_id("not base64!!"), Err(RelayError::MalformedKey));
    }

    #[test]
    fn verify_matches_derivation() {
        let key = STANDARD.encode([1u8; 44]);
        let id = derive_peer_id(&key).unwrap();
        assert!(verify_peer_id(&id, &key));
        assert!(!verify_peer_id("peer_AAAA", &key));
    }

    #[test]
    fn verify_rejects_malformed_key_without_panicking() {
        assert!(!verify_peer_id("peer_anything", "not base64!!"));
    }
}
