//! Instance-scoped local cache sink.
//!
//! Stores the Ledger Image as a JSON array of bytes, the encoding the
//! browser-resident original kept in localStorage. This differs from the
//! remote transport (raw octet stream) and is converted on read/write.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{PdsError, Result};
use crate::fs::write_atomic;
use crate::store::SnapshotSink;

/// File-backed snapshot cache.
pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotSink for LocalCache {
    fn name(&self) -> &'static str {
        "local-cache"
    }

    async fn store(&self, image: &[u8]) -> Result<()> {
        let encoded = serde_json::to_vec(image)?;
        write_atomic(&self.path, &encoded)
            .map_err(|e| PdsError::Storage(format!("cache write failed: {}", e)))
    }

    async fn load(&self) -> Result<Option<Vec<u8>>> {
        let encoded = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PdsError::Storage(format!("cache read failed: {}", e))),
        };
        let image: Vec<u8> = serde_json::from_slice(&encoded)
            .map_err(|e| PdsError::Storage(format!("cache payload corrupt: {}", e)))?;
        Ok(Some(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_store_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let cache = LocalCache::new(dir.path().join("pds.cache.json"));

        cache.store(&[1, 2, 3, 250]).await.unwrap();
        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3, 250]));

        // The on-disk form is a JSON byte array, not raw binary.
        let raw = fs::read(cache.path()).unwrap();
        assert_eq!(raw, b"[1,2,3,250]");
    }

    #[tokio::test]
    async fn test_missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let cache = LocalCache::new(dir.path().join("absent.json"));
        assert_eq!(cache.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pds.cache.json");
        fs::write(&path, b"not json").unwrap();

        let cache = LocalCache::new(path);
        assert!(cache.load().await.is_err());
    }
}
