//! Local filesystem cache store.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── 7363686564756c653a75.json   # hex-encoded key
//! └── ...
//! ```
//!
//! Each file holds a JSON envelope with the value and its expiry time.
//! Writes go to a per-write temporary file first and are renamed into place,
//! so concurrent writers to one key resolve last-write-wins. Expired files
//! are removed when read, and by [`FileCache::purge_expired`], which runs on
//! startup and every [`SWEEP_EVERY`] writes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::{CacheError, CacheResult, CacheStore};

/// Number of writes between expiry sweeps.
pub const SWEEP_EVERY: u64 = 256;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    expires_at: DateTime<Utc>,
    value: String,
}

/// Cache store backed by one file per key.
#[derive(Debug, Clone)]
pub struct FileCache {
    root_dir: PathBuf,
    writes: Arc<AtomicU64>,
}

impl FileCache {
    /// Create a FileCache rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Keys contain `:` and may contain other characters that are not
    /// portable in file names.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(format!("{}.json", hex::encode(key)))
    }

    /// Write bytes atomically (write to a temp file unique to this write,
    /// then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root_dir).await?;

        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}.{}.tmp", std::process::id(), seq));
        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            drop(file);
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }

    /// Remove every expired or unreadable entry file. Returns how many were
    /// removed. A missing root directory holds nothing to purge.
    pub async fn purge_expired(&self) -> CacheResult<u64> {
        let mut entries = match tokio::fs::read_dir(&self.root_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_error(e)),
        };

        let now = Utc::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(bytes) = self.read_bytes(&path).await? else {
                continue;
            };
            let expired = serde_json::from_slice::<Envelope>(&bytes)
                .map(|envelope| envelope.expires_at <= now)
                .unwrap_or(true);
            if expired && self.remove(&path).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            log::info!(
                "Purged {} expired cache files from {}",
                removed,
                self.root_dir.display()
            );
        }
        Ok(removed)
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self, path: &Path) -> CacheResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    /// Remove a file, reporting whether it existed.
    async fn remove(&self, path: &Path) -> CacheResult<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(e)),
        }
    }
}

fn io_error(err: std::io::Error) -> CacheError {
    CacheError::Operation(err.to_string())
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let path = self.path(key);
        let Some(bytes) = self.read_bytes(&path).await? else {
            return Ok(None);
        };

        let envelope: Envelope = serde_json::from_slice(&bytes)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        if envelope.expires_at <= Utc::now() {
            log::debug!("Cache file for '{}' expired at {}", key, envelope.expires_at);
            self.remove(&path).await?;
            return Ok(None);
        }
        Ok(Some(envelope.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Operation(format!("TTL out of range: {e}")))?;
        let envelope = Envelope {
            expires_at: Utc::now() + ttl,
            value: value.to_string(),
        };
        let bytes =
            serde_json::to_vec(&envelope).map_err(|e| CacheError::Serialization(e.to_string()))?;

        self.write_bytes(&self.path(key), &bytes)
            .await
            .map_err(io_error)?;

        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            if let Err(e) = self.purge_expired().await {
                log::warn!("Cache sweep failed: {e}");
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        Ok(u64::from(self.remove(&self.path(key)).await?))
    }
}
