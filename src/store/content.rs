//! Hash-addressed upload store
//!
//! Uploads are immutable and sharded by the first two characters of their
//! key: `<root>/ab/abcdef....sqlite`.

use crate::error::{MapmergeError, MapmergeResult};
use crate::store::keys::ContentKey;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

/// Upload store rooted at a directory
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Location of the upload for `key` (whether or not it exists)
    pub fn path_for(&self, key: &ContentKey) -> PathBuf {
        self.root
            .join(key.shard())
            .join(format!("{}.sqlite", key))
    }

    /// Whether an upload exists for `key`
    pub async fn exists(&self, key: &ContentKey) -> bool {
        fs::try_exists(self.path_for(key)).await.unwrap_or(false)
    }

    /// Resolve `key` to an existing upload
    pub async fn require(&self, key: &ContentKey) -> MapmergeResult<PathBuf> {
        let path = self.path_for(key);
        if fs::try_exists(&path).await.unwrap_or(false) {
            Ok(path)
        } else {
            debug!("Tried to access non-existent map '{}'", path.display());
            Err(MapmergeError::UnknownInput(path))
        }
    }

    /// Resolve every key in order, failing on the first missing upload
    pub async fn require_all(&self, keys: &[ContentKey]) -> MapmergeResult<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(keys.len());
        for key in keys {
            paths.push(self.require(key).await?);
        }
        Ok(paths)
    }

    /// Store an upload and return its key
    ///
    /// Writes go to a uniquely named sibling first and are renamed into
    /// place, so a reader never sees a partially written upload.
    pub async fn store(&self, bytes: &[u8]) -> MapmergeResult<ContentKey> {
        let key = ContentKey::for_bytes(bytes);
        let path = self.path_for(&key);

        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!("Upload {} already stored", key);
            return Ok(key);
        }

        let shard_dir = self.root.join(key.shard());
        fs::create_dir_all(&shard_dir)
            .await
            .map_err(|e| MapmergeError::io(format!("creating {}", shard_dir.display()), e))?;

        let staging = shard_dir.join(format!(".{}.{}.upload", key, Uuid::new_v4()));
        if let Err(e) = fs::write(&staging, bytes).await {
            let _ = fs::remove_file(&staging).await;
            return Err(MapmergeError::io(format!("writing {}", staging.display()), e));
        }
        fs::rename(&staging, &path)
            .await
            .map_err(|e| MapmergeError::io(format!("publishing {}", path.display()), e))?;

        info!("Stored upload {} ({} bytes)", key, bytes.len());
        Ok(key)
    }
}
