//! Keypair generation and the signer-side half of the challenge handshake.
//!
//! Peers store keys on disk as raw 32-byte values (the `id_ed25519`
//! convention) but put the SPKI-encoded form on the wire, since that's
//! what a `PublicKey` is. This module is the one place that bridges the
//! two encodings.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::pkcs8::EncodePublicKey;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::canonical;

/// Generate a fresh Ed25519 keypair.
pub fn generate() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Encode a verifying key as standard-base64 SPKI — the wire `PublicKey` form.
pub fn spki_b64(verifying_key: &VerifyingKey) -> String {
    let der = verifying_key
        .to_public_key_der()
        .expect("ed25519 SPKI encoding is infallible for a valid key");
    STANDARD.encode(der.as_bytes())
}

/// Encode the raw 32-byte signing key seed as base64, for on-disk storage.
pub fn signing_key_to_raw_b64(signing_key: &SigningKey) -> String {
    STANDARD.encode(signing_key.to_bytes())
}

/// Decode a raw 32-byte signing key seed from base64.
pub fn signing_key_from_raw_b64(s: &str) -> Result<SigningKey, crate::error::RelayError> {
    let bytes = STANDARD.decode(s.trim()).map_err(|_| crate::error::RelayError::MalformedKey)?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| crate::error::RelayError::MalformedKey)?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Sign the canonical-JSON encoding of `challenge`, returning base64.
pub fn sign_challenge(signing_key: &SigningKey, challenge: &str) -> String {
    let message = canonical::canonicalize_str(challenge);
    let sig = signing_key.sign(message.as_bytes());
    STANDARD.encode(sig.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{identity, signature};

    #[test]
    fn generated_key_round_trips_through_storage() {
        let key = generate();
        let raw = signing_key_to_raw_b64(&key);
        let restored = signing_key_from_raw_b64(&raw).unwrap();
        assert_eq!(key.to_bytes(), restored.to_bytes());
    }

    #[test]
    fn signed_challenge_verifies_and_id_derives() {
        let key = generate();
        let pk = spki_b64(&key.verifying_key());
        let id = identity::derive_peer_id(&pk).unwrap();
        assert!(identity::verify_peer_id(&id, &pk));

        let sig = sign_challenge(&key, "deadbeef");
        assert!(signature::verify("deadbeef", &pk, &sig));
    }
}
