//! On-disk tier holding encoded image bytes.
//!
//! # File Layout
//!
//! ```text
//! {root}/{hex key}            one file per entry, no extension
//! {root}/telescope.json       metadata index (owned by `MetadataIndex`)
//! {root}/.{hex key}.{n}.tmp   in-progress writes
//! ```
//!
//! Writes go to a uniquely named temp file that is then renamed over the
//! target, so a reader sees either the old bytes or the new bytes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, info};

use crate::cache::{CacheError, CacheKey};

/// Durable map from cache key to encoded bytes.
pub struct DiskTier {
    directory: PathBuf,
    temp_counter: AtomicU64,
}

impl DiskTier {
    /// Open the tier rooted at `directory`, creating it if missing.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await?;

        info!(dir = %directory.display(), "Disk tier opened");

        Ok(Self {
            directory,
            temp_counter: AtomicU64::new(0),
        })
    }

    /// Root directory of the tier.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(key.as_str())
    }

    /// Read the bytes stored for `key`.
    ///
    /// A missing file is `Ok(None)`; other read failures are errors.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store `data` under `key`, replacing any previous file atomically.
    pub async fn put(&self, key: &CacheKey, data: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp_path = self
            .directory
            .join(format!(".{}.{}.{}.tmp", key, std::process::id(), n));

        if let Err(e) = tokio::fs::write(&temp_path, data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(key = %key, bytes = data.len(), "Disk tier write");
        Ok(())
    }

    /// Delete the file for `key`.
    ///
    /// Returns whether a file was removed. A missing file is not an error.
    pub async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a file exists for `key`.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .unwrap_or(false)
    }

    /// Time since the entry for `key` was created.
    ///
    /// Falls back to the modification time on filesystems that do not record
    /// creation time. Returns `None` when the file does not exist.
    pub async fn age_of(&self, key: &CacheKey) -> Option<Duration> {
        let metadata = tokio::fs::metadata(self.path_for(key)).await.ok()?;
        let created = metadata.created().or_else(|_| metadata.modified()).ok()?;
        Some(
            SystemTime::now()
                .duration_since(created)
                .unwrap_or(Duration::ZERO),
        )
    }

    /// Keys of every entry currently on disk.
    pub async fn keys(&self) -> Result<Vec<CacheKey>, CacheError> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(key) = entry.file_name().to_str().and_then(CacheKey::from_hex) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// Remove everything inside the root directory.
    ///
    /// The directory itself is kept (or recreated). Returns the number of
    /// directory entries removed.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.directory).await?;
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                // Raced with a concurrent delete
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            dir = %self.directory.display(),
            removed = removed,
            "Disk tier cleared"
        );
        Ok(removed)
    }
}
