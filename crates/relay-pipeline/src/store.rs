use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::Result;

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Content-addressed blob directory sharded by the first two hex chars.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, hash: &str) -> PathBuf {
        let shard = hash.get(..2).unwrap_or(hash);
        self.root.join(shard).join(hash)
    }

    /// Write `bytes` under `hash` unless a blob is already stored there.
    pub async fn put(&self, hash: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(hash);
        if tokio::fs::try_exists(&path).await? {
            debug!(hash, "blob already stored");
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(hash, bytes = bytes.len(), "blob stored");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn identical_bytes_stored_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let hash = content_hash(b"payload");

        let first = store.put(&hash, b"payload").await.unwrap();
        let second = store.put(&hash, b"payload").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, dir.path().join(&hash[..2]).join(&hash));

        let shard = std::fs::read_dir(dir.path().join(&hash[..2])).unwrap().count();
        assert_eq!(shard, 1);
    }
}
