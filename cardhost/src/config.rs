//! Cardhost CLI flags and the on-disk key/config store.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::CardhostError;

#[derive(Debug, Clone, Parser)]
#[command(name = "cardhost", about = "Connects a local smart-card reader to a Router")]
pub struct CardhostConfig {
    /// Router base URL (e.g. https://relay.example.com).
    #[arg(long, env = "ROUTER_URL")]
    pub router: String,

    /// Use the in-process mock smart card instead of a physical reader.
    #[arg(long, env = "USE_MOCK", default_value_t = false)]
    pub mock: bool,

    #[arg(long, env = "ROUTER_LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Path to the persisted identity file. Defaults to a per-user config dir.
    #[arg(long)]
    pub keystore_path: Option<PathBuf>,
}

impl CardhostConfig {
    pub fn keystore_path(&self) -> PathBuf {
        self.keystore_path.clone().unwrap_or_else(default_keystore_path)
    }
}

fn default_keystore_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cardhost")
        .join("identity.json")
}

/// The persisted Cardhost identity: `{uuid, publicKey, privateKey, routerUrl, createdAt}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub uuid: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
    #[serde(rename = "routerUrl")]
    pub router_url: String,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Loads or creates the identity file at `path`, enforcing 0o600 on the
/// file and 0o700 on its parent directory.
pub fn load_or_create(path: &Path, router_url: &str) -> Result<Identity, CardhostError> {
    if let Some(existing) = try_load(path)? {
        return Ok(existing);
    }

    let signing_key = relay_protocol::keys::generate();
    let public_key = relay_protocol::keys::spki_b64(&signing_key.verifying_key());
    let uuid = relay_protocol::identity::derive_peer_id(&public_key)?;
    let identity = Identity {
        uuid,
        public_key,
        private_key: relay_protocol::keys::signing_key_to_raw_b64(&signing_key),
        router_url: router_url.to_string(),
        created_at: chrono::Utc::now(),
    };
    save(path, &identity)?;
    Ok(identity)
}

fn try_load(path: &Path) -> Result<Option<Identity>, CardhostError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(CardhostError::Io)?;
    let identity: Identity = serde_json::from_str(&raw).map_err(CardhostError::Serde)?;
    Ok(Some(identity))
}

fn save(path: &Path, identity: &Identity) -> Result<(), CardhostError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(CardhostError::Io)?;
        set_permissions(dir, 0o700)?;
    }
    let json = serde_json::to_string_pretty(identity).map_err(CardhostError::Serde)?;
    std::fs::write(path, json).map_err(CardhostError::Io)?;
    set_permissions(path, 0o600)?;
    Ok(())
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<(), CardhostError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(CardhostError::Io)
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<(), CardhostError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_or_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let first = load_or_create(&path, "https://router.example").unwrap();
        let second = load_or_create(&path, "https://router.example").unwrap();
        assert_eq!(first.uuid, second.uuid);
        assert_eq!(first.private_key, second.private_key);
    }

    #[test]
    fn persisted_identity_matches_derived_peer_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let identity = load_or_create(&path, "https://router.example").unwrap();
        assert_eq!(identity.uuid, relay_protocol::identity::derive_peer_id(&identity.public_key).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn identity_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        load_or_create(&path, "https://router.example").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
