//! Writer identity: the single Ed25519 keypair that signs every entry.

use crate::entry::EntrySignature;
use crate::error::{ChainError, ChainResult};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use std::fs;
use std::path::Path;

pub const KEY_FILE: &str = "agent.key";
pub const PUB_FILE: &str = "agent.pub";

/// The chain's writer key. A chain has exactly one of these at a time.
pub struct WriterKey {
    signing: SigningKey,
}

impl WriterKey {
    /// Generate a fresh key from OS entropy.
    pub fn generate() -> ChainResult<Self> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)
            .map_err(|e| ChainError::SignatureFailed(format!("entropy unavailable: {e}")))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// Load the writer key from a hex seed file.
    pub fn load(path: &Path) -> ChainResult<Self> {
        let text = fs::read_to_string(path)?;
        let bytes = hex::decode(text.trim())
            .map_err(|e| ChainError::SignatureFailed(format!("bad key file {path:?}: {e}")))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ChainError::SignatureFailed(format!("key file {path:?} is not 32 bytes")))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// Persist the seed (mode 0600) and the public half next to it.
    pub fn save(&self, key_path: &Path, pub_path: &Path) -> ChainResult<()> {
        fs::write(key_path, hex::encode(self.signing.to_bytes()))?;
        restrict_mode(key_path)?;
        fs::write(pub_path, hex::encode(self.signing.verifying_key().to_bytes()))?;
        Ok(())
    }

    pub fn sign(&self, bytes: &[u8]) -> EntrySignature {
        self.signing.sign(bytes).into()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }
}

/// Load just the public half, for verify-only paths.
pub fn load_verifying_key(path: &Path) -> ChainResult<VerifyingKey> {
    let text = fs::read_to_string(path)?;
    let bytes = hex::decode(text.trim())
        .map_err(|e| ChainError::SignatureFailed(format!("bad public key file {path:?}: {e}")))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ChainError::SignatureFailed(format!("public key file {path:?} is not 32 bytes")))?;
    VerifyingKey::from_bytes(&arr)
        .map_err(|e| ChainError::SignatureFailed(format!("invalid public key: {e}")))
}

#[cfg(unix)]
fn restrict_mode(path: &Path) -> ChainResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_mode(_path: &Path) -> ChainResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let key_path = dir.path().join(KEY_FILE);
        let pub_path = dir.path().join(PUB_FILE);

        let key = WriterKey::generate().unwrap();
        key.save(&key_path, &pub_path).unwrap();

        let loaded = WriterKey::load(&key_path).unwrap();
        assert_eq!(
            key.verifying_key().to_bytes(),
            loaded.verifying_key().to_bytes()
        );
        let public = load_verifying_key(&pub_path).unwrap();
        assert_eq!(public.to_bytes(), key.verifying_key().to_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn private_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let key_path = dir.path().join(KEY_FILE);
        let key = WriterKey::generate().unwrap();
        key.save(&key_path, &dir.path().join(PUB_FILE)).unwrap();
        let mode = std::fs::metadata(&key_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
