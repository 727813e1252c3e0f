use crate::{REDACTION_SENTINEL, StoreError, StoreResult, io_error};
use mnemo_canon::{Digest, normalize_text};
use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

/// Filesystem blob store rooted at `<chain dir>/content`, sharded by the
/// first byte of the digest. Writes go through a temp file and an atomic
/// rename keyed by the final digest, so duplicate writes are idempotent and
/// a crash never leaves a half-written blob under its final name.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

const CONTENT_DIR: &str = "content";

impl FsStore {
    pub fn open(chain_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let root = chain_dir.as_ref().join(CONTENT_DIR);
        fs::create_dir_all(&root).map_err(|e| io_error(&root, e))?;
        Ok(Self { root })
    }

    /// Normalize `text` and store it, returning the digest of the normalized
    /// bytes. Calling this twice with equivalent content is a no-op.
    pub fn put(&self, text: &str) -> StoreResult<Digest> {
        let normalized = normalize_text(text);
        let digest = Digest::of_bytes(normalized.as_bytes());
        self.write_blob(&digest, normalized.as_bytes())?;
        Ok(digest)
    }

    /// Fetch a blob and verify it against its digest. A redacted blob is
    /// returned as the sentinel without a digest check.
    pub fn get(&self, digest: &Digest) -> StoreResult<Vec<u8>> {
        let path = self.blob_path(digest);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*digest));
            }
            Err(err) => return Err(io_error(path, err)),
        };
        if bytes == REDACTION_SENTINEL {
            return Ok(bytes);
        }
        let actual = Digest::of_bytes(&bytes);
        if actual != *digest {
            return Err(StoreError::HashMismatch {
                expected: *digest,
                actual,
            });
        }
        Ok(bytes)
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.blob_path(digest).exists()
    }

    /// Overwrite a blob in place with the redaction sentinel. The blob stays
    /// addressable under its original digest so the signed entry header
    /// referencing it keeps verifying.
    pub fn redact(&self, digest: &Digest) -> StoreResult<()> {
        let path = self.blob_path(digest);
        if !path.exists() {
            return Err(StoreError::NotFound(*digest));
        }
        self.write_atomic(&path, REDACTION_SENTINEL)?;
        log::debug!("redacted blob {digest}");
        Ok(())
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        self.root.join(&hex[..2]).join(hex)
    }

    fn write_blob(&self, digest: &Digest, bytes: &[u8]) -> StoreResult<()> {
        let path = self.blob_path(digest);
        if path.exists() {
            return Ok(());
        }
        self.write_atomic(&path, bytes)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let parent = path
            .parent()
            .expect("blob paths always have a shard parent");
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
            file.write_all(bytes).map_err(|e| io_error(&tmp, e))?;
            file.sync_all().map_err(|e| io_error(&tmp, e))?;
        }
        fs::rename(&tmp, path).map_err(|e| io_error(path, e))
    }
}
