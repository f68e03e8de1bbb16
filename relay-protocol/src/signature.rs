//! Ed25519 signature verification over canonical-JSON challenges.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::canonical;

/// Verify a detached signature over the canonical-JSON encoding of `challenge`.
///
/// Any failure along the way — bad base64, bad SPKI, bad signature —
/// collapses to `false`. The caller never learns *which* step failed;
/// distinguishing "bad key" from "bad signature" would hand an attacker
/// an oracle.
pub fn verify(challenge: &str, spki_b64: &str, sig_b64: &str) -> bool {
    try_verify(challenge, spki_b64, sig_b64).unwrap_or(false)
}

fn try_verify(challenge: &str, spki_b64: &str, sig_b64: &str) -> Option<bool> {
    let spki_bytes = STANDARD.decode(spki_b64).ok()?;
    let verifying_key = VerifyingKey::from_public_key_der(&spki_bytes).ok()?;

    let sig_bytes = STANDARD.decode(sig_b64).ok()?;
    let sig_bytes: [u8; 64] = sig_bytes.try_into().ok()?;
    let signature = Signature::from_bytes(&sig_bytes);

    let message = canonical::canonicalize_str(challenge);
    Some(verifying_key.verify(message.as_bytes(), &signature).is_ok())
}
