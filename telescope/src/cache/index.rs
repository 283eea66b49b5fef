//! Metadata index mapping canonical cache keys to their resource identifiers.
//!
//! The index drives `refresh_all`: it is the only record of which URL produced
//! a given disk file. It is advisory. The disk tier decides whether an entry
//! exists, and a short window where the two disagree is tolerated.
//!
//! # Persistence
//!
//! The mapping is stored as a flat JSON object (`{"<hex key>": "<identifier>"}`).
//! Mutations only mark the index dirty; a background daemon started with
//! [`spawn_flush_daemon`] rewrites the file on a fixed interval and once more
//! on shutdown.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, CacheKey};

/// Concurrency-safe key -> identifier map with debounced persistence.
pub struct MetadataIndex {
    /// Location of the JSON file.
    path: PathBuf,
    /// In-memory mapping; readers take snapshots under the read lock.
    entries: RwLock<BTreeMap<CacheKey, String>>,
    /// Set by every mutation, cleared by a flush.
    dirty: AtomicBool,
    /// Serializes file writes so an older snapshot never lands last.
    write_lock: tokio::sync::Mutex<()>,
}

impl MetadataIndex {
    /// Create an empty index that persists to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(BTreeMap::new()),
            dirty: AtomicBool::new(false),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the index from `path`.
    ///
    /// A missing, unreadable or corrupt file yields an empty index; the cache
    /// then behaves as a cold start. Entries whose key is not a valid hex
    /// fingerprint are dropped.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let index = Self::empty(path);

        let bytes = match tokio::fs::read(&index.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %index.path.display(), "No metadata index file, starting empty");
                return index;
            }
            Err(e) => {
                warn!(path = %index.path.display(), error = %e, "Failed to read metadata index, starting empty");
                return index;
            }
        };

        let raw: BTreeMap<String, String> = match serde_json::from_slice(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %index.path.display(), error = %e, "Corrupt metadata index, starting empty");
                // Rewrite on the next flush
                index.dirty.store(true, Ordering::Release);
                return index;
            }
        };

        let mut skipped = 0usize;
        {
            let mut entries = index.entries.write();
            for (hex, identifier) in raw {
                match CacheKey::from_hex(&hex) {
                    Some(key) => {
                        entries.insert(key, identifier);
                    }
                    None => skipped += 1,
                }
            }
        }
        if skipped > 0 {
            index.dirty.store(true, Ordering::Release);
        }

        info!(
            path = %index.path.display(),
            entries = index.len(),
            skipped = skipped,
            "Metadata index loaded"
        );
        index
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record that `key` was produced from `identifier`.
    pub fn insert(&self, key: CacheKey, identifier: impl Into<String>) {
        self.entries.write().insert(key, identifier.into());
        self.dirty.store(true, Ordering::Release);
    }

    /// Forget `key`, returning the identifier it mapped to.
    pub fn remove(&self, key: &CacheKey) -> Option<String> {
        let removed = self.entries.write().remove(key);
        if removed.is_some() {
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    /// Identifier recorded for `key`.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    /// Consistent snapshot of every entry.
    pub fn entries(&self) -> Vec<(CacheKey, String)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
        self.dirty.store(true, Ordering::Release);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether there are mutations not yet written to disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Write the full mapping to the backing file, replacing it atomically.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;

        // Cleared before the snapshot so a concurrent mutation re-marks it
        self.dirty.store(false, Ordering::Release);
        let snapshot: BTreeMap<String, String> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();

        let result = self.write_snapshot(&snapshot).await;
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        } else {
            debug!(path = %self.path.display(), entries = snapshot.len(), "Metadata index flushed");
        }
        result
    }

    /// Flush only when there are pending mutations. Returns whether a write happened.
    pub async fn flush_if_dirty(&self) -> Result<bool, CacheError> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.flush().await?;
        Ok(true)
    }

    async fn write_snapshot(&self, snapshot: &BTreeMap<String, String>) -> Result<(), CacheError> {
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| CacheError::Io(Arc::new(std::io::Error::other(e))))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

/// Run a daemon that flushes `index` every `interval` while it is dirty.
///
/// When `shutdown` is cancelled the daemon performs a final flush and exits.
pub fn spawn_flush_daemon(
    index: Arc<MetadataIndex>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(
            path = %index.path().display(),
            interval_ms = interval.as_millis() as u64,
            "Metadata index flush daemon started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    if let Err(e) = index.flush_if_dirty().await {
                        warn!(error = %e, "Final metadata index flush failed");
                    }
                    debug!("Metadata index flush daemon stopped");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = index.flush_if_dirty().await {
                        warn!(error = %e, "Metadata index flush failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(n: u32) -> CacheKey {
        CacheKey::derive(&format!("https://example.com/{n}.png"), None)
    }

    fn index_path(dir: &TempDir) -> PathBuf {
        dir.path().join("telescope.json")
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let index = MetadataIndex::load(index_path(&dir)).await;
        assert!(index.is_empty());
        assert!(!index.is_dirty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(index_path(&dir), b"{ not json").unwrap();

        let index = MetadataIndex::load(index_path(&dir)).await;
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_load_drops_malformed_keys() {
        let dir = TempDir::new().unwrap();
        let good = key(1);
        let json = format!(
            r#"{{"{}": "https://example.com/1.png", "nope": "https://example.com/x.png"}}"#,
            good
        );
        std::fs::write(index_path(&dir), json).unwrap();

        let index = MetadataIndex::load(index_path(&dir)).await;
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&good).as_deref(), Some("https://example.com/1.png"));
    }

    #[tokio::test]
    async fn test_insert_remove() {
        let dir = TempDir::new().unwrap();
        let index = MetadataIndex::empty(index_path(&dir));

        index.insert(key(1), "https://example.com/1.png");
        assert!(index.is_dirty());
        assert_eq!(index.len(), 1);

        assert_eq!(
            index.remove(&key(1)).as_deref(),
            Some("https://example.com/1.png")
        );
        assert!(index.remove(&key(1)).is_none());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_flush_and_reload() {
        let dir = TempDir::new().unwrap();
        let index = MetadataIndex::empty(index_path(&dir));
        index.insert(key(1), "https://example.com/1.png");
        index.insert(key(2), "https://example.com/2.png");

        index.flush().await.unwrap();
        assert!(!index.is_dirty());

        let reloaded = MetadataIndex::load(index_path(&dir)).await;
        let mut entries = reloaded.entries();
        entries.sort();
        let mut expected = index.entries();
        expected.sort();
        assert_eq!(entries, expected);
    }

    #[tokio::test]
    async fn test_file_is_flat_json_object() {
        let dir = TempDir::new().unwrap();
        let index = MetadataIndex::empty(index_path(&dir));
        index.insert(key(1), "https://example.com/1.png");
        index.flush().await.unwrap();

        let raw: BTreeMap<String, String> =
            serde_json::from_slice(&std::fs::read(index_path(&dir)).unwrap()).unwrap();
        assert_eq!(
            raw.get(key(1).as_str()).map(String::as_str),
            Some("https://example.com/1.png")
        );
    }

    #[tokio::test]
    async fn test_flush_if_dirty() {
        let dir = TempDir::new().unwrap();
        let index = MetadataIndex::empty(index_path(&dir));

        assert!(!index.flush_if_dirty().await.unwrap());
        assert!(!index_path(&dir).exists());

        index.insert(key(1), "https://example.com/1.png");
        assert!(index.flush_if_dirty().await.unwrap());
        assert!(index_path(&dir).exists());
    }

    #[tokio::test]
    async fn test_clear_flushes_empty_object() {
        let dir = TempDir::new().unwrap();
        let index = MetadataIndex::empty(index_path(&dir));
        index.insert(key(1), "https://example.com/1.png");
        index.flush().await.unwrap();

        index.clear();
        index.flush().await.unwrap();

        let raw: BTreeMap<String, String> =
            serde_json::from_slice(&std::fs::read(index_path(&dir)).unwrap()).unwrap();
        assert!(raw.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_mutations() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(MetadataIndex::empty(index_path(&dir)));

        let mut handles = Vec::new();
        for n in 0..100 {
            let index = Arc::clone(&index);
            handles.push(tokio::spawn(async move {
                index.insert(key(n), format!("https://example.com/{n}.png"));
                let _ = index.entries();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(index.len(), 100);
    }

    #[tokio::test]
    async fn test_flush_daemon_writes_and_final_flush() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(MetadataIndex::empty(index_path(&dir)));
        let shutdown = CancellationToken::new();
        let handle = spawn_flush_daemon(
            Arc::clone(&index),
            Duration::from_secs(3600),
            shutdown.clone(),
        );

        index.insert(key(1), "https://example.com/1.png");
        shutdown.cancel();
        handle.await.unwrap();

        let reloaded = MetadataIndex::load(index_path(&dir)).await;
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_daemon_periodic() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(MetadataIndex::empty(index_path(&dir)));
        let shutdown = CancellationToken::new();
        let handle = spawn_flush_daemon(
            Arc::clone(&index),
            Duration::from_millis(20),
            shutdown.clone(),
        );

        index.insert(key(1), "https://example.com/1.png");

        let mut flushed = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if !index.is_dirty() && index_path(&dir).exists() {
                flushed = true;
                break;
            }
        }
        assert!(flushed, "Daemon should flush a dirty index");

        shutdown.cancel();
        handle.await.unwrap();
    }
}
