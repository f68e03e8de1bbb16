//! Controller key persistence: two files, `id_ed25519` (0o600) and
//! `id_ed25519.pub` (0o644), each a base64 string — the SSH-style split
//! rather than the single-JSON-file layout the Cardhost uses, since a
//! Controller has nothing else worth persisting alongside the key.

use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;

use crate::error::ControllerError;

pub fn default_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("controller")
}

/// Load the keypair at `dir/id_ed25519{,.pub}`, generating and persisting
/// a fresh one if absent.
pub fn load_or_create(dir: &Path) -> Result<(SigningKey, String), ControllerError> {
    let priv_path = dir.join("id_ed25519");
    let pub_path = dir.join("id_ed25519.pub");

    if priv_path.exists() {
        let raw = std::fs::read_to_string(&priv_path).map_err(ControllerError::Io)?;
        let signing_key = relay_protocol::keys::signing_key_from_raw_b64(raw.trim())?;
        let public_key = std::fs::read_to_string(&pub_path).map_err(ControllerError::Io)?.trim().to_string();
        return Ok((signing_key, public_key));
    }

    std::fs::create_dir_all(dir).map_err(ControllerError::Io)?;
    set_permissions(dir, 0o700)?;

    let signing_key = relay_protocol::keys::generate();
    let public_key = relay_protocol::keys::spki_b64(&signing_key.verifying_key());
    let private_raw = relay_protocol::keys::signing_key_to_raw_b64(&signing_key);

    std::fs::write(&priv_path, &private_raw).map_err(ControllerError::Io)?;
    set_permissions(&priv_path, 0o600)?;
    std::fs::write(&pub_path, &public_key).map_err(ControllerError::Io)?;
    set_permissions(&pub_path, 0o644)?;

    Ok((signing_key, public_key))
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<(), ControllerError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(ControllerError::Io)
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<(), ControllerError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_or_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (key_a, pk_a) = load_or_create(dir.path()).unwrap();
        let (key_b, pk_b) = load_or_create(dir.path()).unwrap();
        assert_eq!(key_a.to_bytes(), key_b.to_bytes());
        assert_eq!(pk_a, pk_b);
    }

    #[cfg(unix)]
    #[test]
    fn private_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        load_or_create(dir.path()).unwrap();
        let mode = std::fs::metadata(dir.path().join("id_ed25519")).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let pub_mode = std::fs::metadata(dir.path().join("id_ed25519.pub")).unwrap().permissions().mode() & 0o777;
        assert_eq!(pub_mode, 0o644);
    }
}
