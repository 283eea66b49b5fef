//! The cache engine: coordinates the memory tier, the disk tier, the metadata
//! index and the fetcher.
//!
//! # Read path
//!
//! ```text
//! get(u) ──► MemoryTier ──hit──────────────────────────────► return
//!               │ miss
//!               ▼
//!            DiskTier ──hit──► decode ──► MemoryTier ──────► return
//!               │ miss            └─(older than TTL)─► spawn refresh(u)
//!               ▼
//!            Fetcher ──► encode ──► DiskTier + index ──► MemoryTier ──► return
//! ```
//!
//! Tagged reads stop after the disk tier with [`CacheError::EditNotFound`].

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use image::DynamicImage;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::coalesce::{CoalescerStats, FetchCoalescer, Registration};
use super::disk::DiskTier;
use super::index::{spawn_flush_daemon, MetadataIndex};
use super::memory::MemoryTier;
use super::r#trait::{BoxFuture, Cache};
use super::stats::{CacheStats, StatsRecorder};
use super::types::{CacheError, RefreshFailure};
use super::CacheKey;
use crate::codec::{CachedImage, FormatPolicy, ImageCodec, ImageResampler, Resampler};
use crate::config::CacheConfig;
use crate::provider::{Fetcher, Transport};

/// Two-tier image cache.
///
/// Cheap to clone; clones share the same tiers. The root directory and index
/// file must not be opened by a second engine while this one is alive.
pub struct CacheEngine<T, C> {
    inner: Arc<EngineInner<T, C>>,
}

struct EngineInner<T, C> {
    config: CacheConfig,
    memory: MemoryTier,
    disk: DiskTier,
    index: Arc<MetadataIndex>,
    fetcher: Fetcher<T, C>,
    codec: Arc<C>,
    resampler: Arc<dyn Resampler>,
    stats: StatsRecorder,
    coalescer: Option<FetchCoalescer>,
    shutdown: CancellationToken,
    flush_daemon: Mutex<Option<JoinHandle<()>>>,
    refreshes: TaskTracker,
}

impl<T, C> Drop for EngineInner<T, C> {
    fn drop(&mut self) {
        // Lets the flush daemon write a final snapshot
        self.shutdown.cancel();
    }
}

impl<T, C> Clone for CacheEngine<T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// An empty tag addresses the canonical entry.
fn is_canonical(tag: Option<&str>) -> bool {
    tag.is_none_or(str::is_empty)
}

impl<T, C> CacheEngine<T, C>
where
    T: Transport + 'static,
    C: ImageCodec + 'static,
{
    /// Open the cache described by `config`.
    ///
    /// Creates the root directory, loads the metadata index (a missing or
    /// corrupt index starts empty), writes the index file if it does not exist
    /// yet and starts the periodic index flush.
    pub async fn open(config: CacheConfig, transport: T, codec: C) -> Result<Self, CacheError> {
        Self::open_with_resampler(config, transport, codec, ImageResampler::default()).await
    }

    /// [`open`](Self::open) with a custom resampler for [`get_resized`](Self::get_resized).
    pub async fn open_with_resampler<R>(
        config: CacheConfig,
        transport: T,
        codec: C,
        resampler: R,
    ) -> Result<Self, CacheError>
    where
        R: Resampler + 'static,
    {
        let disk = DiskTier::open(config.root_dir.clone()).await?;

        let index_path = config.index_file();
        let index = Arc::new(MetadataIndex::load(index_path.clone()).await);
        let index_exists = tokio::fs::try_exists(&index_path).await.unwrap_or(false);
        if !index_exists || index.is_dirty() {
            index.flush().await?;
        }

        let codec = Arc::new(codec);
        let fetcher = Fetcher::new(Arc::new(transport), Arc::clone(&codec));
        let shutdown = CancellationToken::new();
        let flush_daemon = spawn_flush_daemon(
            Arc::clone(&index),
            config.index_flush_interval,
            shutdown.clone(),
        );

        info!(
            dir = %config.root_dir.display(),
            index_entries = index.len(),
            ttl_secs = config.ttl.as_secs(),
            memory_bytes = config.memory_capacity_bytes,
            coalesce = config.coalesce_fetches,
            "Cache engine opened"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                memory: MemoryTier::new(config.memory_capacity_bytes),
                coalescer: config.coalesce_fetches.then(FetchCoalescer::new),
                config,
                disk,
                index,
                fetcher,
                codec,
                resampler: Arc::new(resampler),
                stats: StatsRecorder::new(),
                shutdown,
                flush_daemon: Mutex::new(Some(flush_daemon)),
                refreshes: TaskTracker::new(),
            }),
        })
    }

    /// Configuration the engine was opened with.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Canonical image for `identifier`.
    ///
    /// Served from memory, then disk, then the network. A disk hit older than
    /// the TTL is returned as-is and refreshed in the background.
    pub async fn get(&self, identifier: &str) -> Result<CachedImage, CacheError> {
        let key = CacheKey::derive(identifier, None);

        if let Some(image) = self.inner.memory.get(&key).await {
            self.inner.stats.record_memory_hit();
            debug!(identifier = identifier, key = %key, "Memory tier hit");
            return Ok(image);
        }
        self.inner.stats.record_memory_miss();

        if let Some(image) = self.read_disk(&key).await {
            self.inner.stats.record_disk_hit();
            debug!(identifier = identifier, key = %key, "Disk tier hit");
            let image = Arc::new(image);
            self.inner.memory.put(key.clone(), Arc::clone(&image)).await;

            if self.inner.config.staleness_enabled() {
                if let Some(age) = self.inner.disk.age_of(&key).await {
                    if age > self.inner.config.ttl {
                        self.spawn_background_refresh(identifier, age);
                    }
                }
            }
            return Ok(image);
        }
        self.inner.stats.record_disk_miss();
        debug!(identifier = identifier, key = %key, "Cache miss, fetching");

        self.fetch_and_store(identifier, &key).await
    }

    /// Variant of `identifier` stored under `tag`.
    ///
    /// # Errors
    ///
    /// [`CacheError::EditNotFound`] when neither tier holds the variant.
    pub async fn get_with_tag(
        &self,
        identifier: &str,
        tag: &str,
    ) -> Result<CachedImage, CacheError> {
        let key = CacheKey::derive(identifier, Some(tag));

        if let Some(image) = self.inner.memory.get(&key).await {
            self.inner.stats.record_memory_hit();
            return Ok(image);
        }
        self.inner.stats.record_memory_miss();

        match self.read_disk(&key).await {
            Some(image) => {
                self.inner.stats.record_disk_hit();
                let image = Arc::new(image);
                self.inner.memory.put(key, Arc::clone(&image)).await;
                Ok(image)
            }
            None => {
                self.inner.stats.record_disk_miss();
                debug!(identifier = identifier, tag = tag, "Tagged variant not found");
                Err(CacheError::EditNotFound(tag.to_string()))
            }
        }
    }

    /// Store a caller-supplied image.
    ///
    /// With `tag = None` the canonical copy is overwritten without touching the
    /// network and the index is updated. Tagged variants never enter the index.
    pub async fn edit(
        &self,
        identifier: &str,
        image: DynamicImage,
        tag: Option<&str>,
    ) -> Result<(), CacheError> {
        self.store(identifier, Arc::new(image), tag).await
    }

    /// Remove one entry from both tiers. Failures are logged, never returned.
    pub async fn delete(&self, identifier: &str, tag: Option<&str>) {
        let key = CacheKey::derive(identifier, tag);
        self.inner.memory.remove(&key).await;
        match self.inner.disk.remove(&key).await {
            Ok(removed) => debug!(identifier = identifier, key = %key, removed = removed, "Entry deleted"),
            Err(e) => warn!(identifier = identifier, key = %key, error = %e, "Failed to delete disk entry"),
        }
        if is_canonical(tag) {
            self.inner.index.remove(&key);
        }
    }

    /// Remove every entry and rewrite an empty index file.
    ///
    /// # Errors
    ///
    /// [`CacheError::Io`] when the directory cannot be cleared.
    pub async fn delete_all(&self) -> Result<(), CacheError> {
        self.inner.memory.clear();
        let removed = self.inner.disk.clear().await?;
        self.inner.index.clear();
        if let Err(e) = self.inner.index.flush().await {
            // Still dirty, the daemon retries
            warn!(error = %e, "Failed to rewrite empty metadata index");
        }
        info!(removed = removed, "Cache cleared");
        Ok(())
    }

    /// Discard the canonical entry for `identifier` and fetch it again.
    pub async fn refresh(&self, identifier: &str) -> Result<(), CacheError> {
        self.refetch(identifier).await.map(|_| ())
    }

    /// Refresh every identifier recorded in the index.
    ///
    /// Runs up to `refresh_concurrency` refreshes at once and reports every
    /// failure in a single [`CacheError::Refresh`].
    pub async fn refresh_all(&self) -> Result<(), CacheError> {
        let identifiers: Vec<String> = self
            .inner
            .index
            .entries()
            .into_iter()
            .map(|(_, identifier)| identifier)
            .collect();
        let total = identifiers.len();

        let failures: Vec<RefreshFailure> = stream::iter(identifiers)
            .map(|identifier| async move {
                let result = self.refetch(&identifier).await;
                (identifier, result)
            })
            .buffer_unordered(self.inner.config.refresh_concurrency.max(1))
            .filter_map(|(identifier, result)| async move {
                result
                    .err()
                    .map(|error| RefreshFailure { identifier, error })
            })
            .collect()
            .await;

        info!(total = total, failed = failures.len(), "Bulk refresh finished");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CacheError::Refresh { failures })
        }
    }

    /// Image for `identifier` resampled to exactly `width` x `height`.
    ///
    /// The result is cached as the variant tagged `"{width}x{height}"`. A miss
    /// resamples the canonical image, fetching it if needed.
    pub async fn get_resized(
        &self,
        identifier: &str,
        width: u32,
        height: u32,
    ) -> Result<CachedImage, CacheError> {
        if width == 0 || height == 0 {
            return Err(CacheError::Encode(format!(
                "target size {width}x{height} has a zero dimension"
            )));
        }

        let tag = format!("{width}x{height}");
        match self.get_with_tag(identifier, &tag).await {
            Ok(image) => return Ok(image),
            Err(CacheError::EditNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let canonical = self.get(identifier).await?;
        let resampler = Arc::clone(&self.inner.resampler);
        let resized = tokio::task::spawn_blocking(move || resampler.resize(&canonical, width, height))
            .await
            .map_err(|e| {
                warn!(identifier = identifier, error = %e, "Resize task failed");
                CacheError::Unknown
            })?;

        let resized = Arc::new(resized);
        self.store(identifier, Arc::clone(&resized), Some(&tag)).await?;
        debug!(identifier = identifier, tag = %tag, "Resized variant stored");
        Ok(resized)
    }

    /// Snapshot of the engine counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    /// Coalescing counters, when coalescing is enabled.
    pub fn coalescer_stats(&self) -> Option<CoalescerStats> {
        self.inner.coalescer.as_ref().map(FetchCoalescer::stats)
    }

    /// Number of canonical entries recorded in the index.
    pub fn indexed_count(&self) -> usize {
        self.inner.index.len()
    }

    /// Number of entries currently in the disk tier.
    pub async fn disk_entry_count(&self) -> Result<usize, CacheError> {
        Ok(self.inner.disk.keys().await?.len())
    }

    /// Approximate (entries, decoded bytes) held by the memory tier.
    pub async fn memory_usage(&self) -> (u64, u64) {
        self.inner.memory.sync().await;
        (
            self.inner.memory.entry_count(),
            self.inner.memory.weighted_size(),
        )
    }

    /// Wait for running background refreshes, stop the index flush daemon and
    /// write any pending index changes.
    ///
    /// Safe to call more than once. Other clones remain usable, but index
    /// changes made afterwards are only persisted by another explicit flush.
    pub async fn shutdown(&self) -> Result<(), CacheError> {
        self.inner.refreshes.close();
        self.inner.refreshes.wait().await;

        self.inner.shutdown.cancel();
        let handle = self.inner.flush_daemon.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Metadata index flush daemon panicked");
            }
        }
        self.inner.index.flush_if_dirty().await?;
        info!(dir = %self.inner.config.root_dir.display(), "Cache engine shut down");
        Ok(())
    }

    async fn refetch(&self, identifier: &str) -> Result<CachedImage, CacheError> {
        let key = CacheKey::derive(identifier, None);

        self.inner.memory.remove(&key).await;
        if let Err(e) = self.inner.disk.remove(&key).await {
            warn!(identifier = identifier, error = %e, "Failed to remove entry before refresh");
        }
        self.inner.index.remove(&key);

        self.fetch_and_store(identifier, &key).await
    }

    fn spawn_background_refresh(&self, identifier: &str, age: Duration) {
        self.inner.stats.record_background_refresh();
        info!(
            identifier = identifier,
            age_secs = age.as_secs(),
            "Disk entry is stale, refreshing in background"
        );

        let engine = self.clone();
        let identifier = identifier.to_string();
        self.inner.refreshes.spawn(async move {
            if let Err(e) = engine.refetch(&identifier).await {
                warn!(identifier = %identifier, error = %e, "Background refresh failed");
            }
        });
    }

    async fn fetch_and_store(
        &self,
        identifier: &str,
        key: &CacheKey,
    ) -> Result<CachedImage, CacheError> {
        let Some(coalescer) = &self.inner.coalescer else {
            return self.fetch_uncoalesced(identifier, key).await;
        };

        match coalescer.register(key) {
            Registration::Leader(leader) => {
                let outcome = self.fetch_uncoalesced(identifier, key).await;
                leader.complete(&outcome);
                outcome
            }
            Registration::Waiter(waiter) => waiter.wait().await,
        }
    }

    /// Fetch, then write through to disk, index and memory.
    ///
    /// A failed fetch writes nothing. A failed disk write still returns the
    /// image, which then lives only in memory.
    async fn fetch_uncoalesced(
        &self,
        identifier: &str,
        key: &CacheKey,
    ) -> Result<CachedImage, CacheError> {
        self.inner.stats.record_fetch();
        let image = match self.inner.fetcher.fetch(identifier).await {
            Ok(image) => Arc::new(image),
            Err(e) => {
                self.inner.stats.record_fetch_failure();
                debug!(identifier = identifier, error = %e, "Fetch failed");
                return Err(e);
            }
        };

        let persisted = match self.encode(&image).await {
            Ok(bytes) => self.inner.disk.put(key, &bytes).await,
            Err(e) => Err(e),
        };
        match persisted {
            Ok(()) => self.inner.index.insert(key.clone(), identifier),
            Err(e) => {
                self.inner.stats.record_disk_write_failure();
                warn!(identifier = identifier, error = %e, "Failed to persist fetched image");
            }
        }

        self.inner.memory.put(key.clone(), Arc::clone(&image)).await;
        Ok(image)
    }

    async fn store(
        &self,
        identifier: &str,
        image: CachedImage,
        tag: Option<&str>,
    ) -> Result<(), CacheError> {
        let key = CacheKey::derive(identifier, tag);
        let bytes = self.encode(&image).await?;
        self.inner.disk.put(&key, &bytes).await?;
        if is_canonical(tag) {
            self.inner.index.insert(key.clone(), identifier);
        }
        self.inner.memory.put(key, image).await;
        debug!(identifier = identifier, tag = tag.unwrap_or(""), "Edit stored");
        Ok(())
    }

    /// Decode the disk entry for `key`. Undecodable entries are removed.
    async fn read_disk(&self, key: &CacheKey) -> Option<DynamicImage> {
        let bytes = match self.inner.disk.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Disk tier read failed, treating as miss");
                return None;
            }
        };

        let codec = Arc::clone(&self.inner.codec);
        let decoded = tokio::task::spawn_blocking(move || codec.decode(&bytes)).await;
        match decoded {
            Ok(Ok(image)) => Some(image),
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Undecodable disk entry, removing");
                if let Err(e) = self.inner.disk.remove(key).await {
                    warn!(key = %key, error = %e, "Failed to remove undecodable disk entry");
                }
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Decode task failed");
                None
            }
        }
    }

    async fn encode(&self, image: &CachedImage) -> Result<Vec<u8>, CacheError> {
        let codec = Arc::clone(&self.inner.codec);
        let policy = self.inner.config.format_policy;
        let image = Arc::clone(image);

        tokio::task::spawn_blocking(move || {
            let (format, quality) = policy.select(codec.has_transparency(&image));
            codec.encode(&image, format, quality)
        })
        .await
        .map_err(|e| CacheError::Encode(e.to_string()))?
        .map_err(|e| CacheError::Encode(e.to_string()))
    }
}

impl<T, C> Cache for CacheEngine<T, C>
where
    T: Transport + 'static,
    C: ImageCodec + 'static,
{
    fn get<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<CachedImage, CacheError>> {
        Box::pin(self.get(identifier))
    }

    fn get_with_tag<'a>(
        &'a self,
        identifier: &'a str,
        tag: &'a str,
    ) -> BoxFuture<'a, Result<CachedImage, CacheError>> {
        Box::pin(self.get_with_tag(identifier, tag))
    }

    fn edit<'a>(
        &'a self,
        identifier: &'a str,
        image: DynamicImage,
        tag: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(self.edit(identifier, image, tag))
    }

    fn delete<'a>(&'a self, identifier: &'a str, tag: Option<&'a str>) -> BoxFuture<'a, ()> {
        Box::pin(self.delete(identifier, tag))
    }

    fn delete_all(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(self.delete_all())
    }

    fn refresh<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(self.refresh(identifier))
    }

    fn refresh_all(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(self.refresh_all())
    }

    fn ttl(&self) -> Duration {
        self.inner.config.ttl
    }

    fn format_policy(&self) -> FormatPolicy {
        self.inner.config.format_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{EncodeFormat, ImageCrateCodec};
    use crate::provider::{MockTransport, TransportError};
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    const URL: &str = "https://example.com/cat.png";

    fn translucent(shade: u8) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(6, 4, Rgba([shade, 0, 0, 128])))
    }

    fn png(image: &DynamicImage) -> Vec<u8> {
        ImageCrateCodec::new()
            .encode(image, EncodeFormat::Png, 1.0)
            .unwrap()
    }

    fn config(dir: &TempDir) -> CacheConfig {
        CacheConfig::default().with_root_dir(dir.path().to_path_buf())
    }

    async fn open_engine(
        dir: &TempDir,
        response: Result<Vec<u8>, TransportError>,
    ) -> (CacheEngine<MockTransport, ImageCrateCodec>, MockTransport) {
        let transport = MockTransport::new(response);
        let engine = CacheEngine::open(config(dir), transport.clone(), ImageCrateCodec::new())
            .await
            .unwrap();
        (engine, transport)
    }

    fn dir_entries(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_open_writes_index_file() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = open_engine(&dir, Ok(Vec::new())).await;

        assert_eq!(dir_entries(&dir), vec!["telescope.json".to_string()]);
        assert_eq!(engine.indexed_count(), 0);
    }

    #[tokio::test]
    async fn test_get_fetches_once_then_hits_memory() {
        let dir = TempDir::new().unwrap();
        let (engine, transport) = open_engine(&dir, Ok(png(&translucent(10)))).await;

        let first = engine.get(URL).await.unwrap();
        let second = engine.get(URL).await.unwrap();

        assert_eq!(transport.call_count(), 1);
        assert_eq!(first.to_rgba8(), second.to_rgba8());
        let stats = engine.stats();
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(engine.indexed_count(), 1);
    }

    #[tokio::test]
    async fn test_get_writes_disk_entry() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = open_engine(&dir, Ok(png(&translucent(10)))).await;

        engine.get(URL).await.unwrap();

        let key = CacheKey::derive(URL, None);
        assert!(dir.path().join(key.as_str()).exists());
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = open_engine(&dir, Err(TransportError::Status(404))).await;

        let result = engine.get(URL).await;

        assert!(matches!(result, Err(CacheError::HttpStatus(404))));
        assert_eq!(engine.indexed_count(), 0);
        assert_eq!(engine.disk_entry_count().await.unwrap(), 0);
        assert_eq!(engine.stats().fetch_failures, 1);
    }

    #[tokio::test]
    async fn test_reopened_engine_serves_from_disk() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = open_engine(&dir, Ok(png(&translucent(10)))).await;
        let original = engine.get(URL).await.unwrap();
        engine.shutdown().await.unwrap();
        drop(engine);

        let (reopened, transport) = open_engine(&dir, Err(TransportError::Network("offline".into()))).await;
        let restored = reopened.get(URL).await.unwrap();

        assert_eq!(transport.call_count(), 0);
        assert_eq!(restored.to_rgba8(), original.to_rgba8());
        assert_eq!(reopened.stats().disk_hits, 1);
        assert_eq!(reopened.indexed_count(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_disk_entry_is_refetched() {
        let dir = TempDir::new().unwrap();
        let key = CacheKey::derive(URL, None);
        std::fs::write(dir.path().join(key.as_str()), b"garbage").unwrap();

        let (engine, transport) = open_engine(&dir, Ok(png(&translucent(10)))).await;
        engine.get(URL).await.unwrap();

        assert_eq!(transport.call_count(), 1);
        assert_eq!(engine.stats().disk_misses, 1);
    }

    #[tokio::test]
    async fn test_tagged_miss_never_fetches() {
        let dir = TempDir::new().unwrap();
        let (engine, transport) = open_engine(&dir, Ok(png(&translucent(10)))).await;

        let result = engine.get_with_tag(URL, "crop").await;

        assert!(matches!(result, Err(CacheError::EditNotFound(tag)) if tag == "crop"));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_tagged_edit_is_not_indexed() {
        let dir = TempDir::new().unwrap();
        let (engine, transport) = open_engine(&dir, Ok(Vec::new())).await;

        engine.edit(URL, translucent(50), Some("crop")).await.unwrap();
        let stored = engine.get_with_tag(URL, "crop").await.unwrap();

        assert_eq!(stored.to_rgba8(), translucent(50).to_rgba8());
        assert_eq!(engine.indexed_count(), 0);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_canonical_edit_replaces_without_network() {
        let dir = TempDir::new().unwrap();
        let (engine, transport) = open_engine(&dir, Ok(png(&translucent(10)))).await;

        engine.edit(URL, translucent(99), None).await.unwrap();
        let image = engine.get(URL).await.unwrap();

        assert_eq!(image.to_rgba8(), translucent(99).to_rgba8());
        assert_eq!(transport.call_count(), 0);
        assert_eq!(engine.indexed_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_entry_and_index() {
        let dir = TempDir::new().unwrap();
        let (engine, transport) = open_engine(&dir, Ok(png(&translucent(10)))).await;
        engine.get(URL).await.unwrap();

        engine.delete(URL, None).await;

        assert_eq!(engine.indexed_count(), 0);
        assert_eq!(engine.disk_entry_count().await.unwrap(), 0);
        engine.get(URL).await.unwrap();
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_delete_absent_entry_is_silent() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = open_engine(&dir, Ok(Vec::new())).await;
        engine.delete(URL, Some("never-stored")).await;
    }

    #[tokio::test]
    async fn test_delete_all_leaves_only_index_file() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = open_engine(&dir, Ok(png(&translucent(10)))).await;
        engine.get(URL).await.unwrap();
        engine.edit(URL, translucent(20), Some("t1")).await.unwrap();

        engine.delete_all().await.unwrap();

        assert_eq!(dir_entries(&dir), vec!["telescope.json".to_string()]);
        assert_eq!(engine.indexed_count(), 0);
        let index = std::fs::read_to_string(dir.path().join("telescope.json")).unwrap();
        assert_eq!(index.trim(), "{}");
    }

    #[tokio::test]
    async fn test_refresh_all_collects_failures() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = open_engine(&dir, Err(TransportError::Status(500))).await;
        engine.edit("https://example.com/a.png", translucent(1), None).await.unwrap();
        engine.edit("https://example.com/b.png", translucent(2), None).await.unwrap();

        let result = engine.refresh_all().await;

        match result {
            Err(CacheError::Refresh { failures }) => {
                assert_eq!(failures.len(), 2);
                assert!(failures
                    .iter()
                    .all(|f| matches!(f.error, CacheError::HttpStatus(500))));
            }
            other => panic!("expected refresh failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_resized_caches_variant() {
        let dir = TempDir::new().unwrap();
        let (engine, transport) = open_engine(&dir, Ok(png(&translucent(10)))).await;

        let resized = engine.get_resized(URL, 3, 2).await.unwrap();
        assert_eq!((resized.width(), resized.height()), (3, 2));

        let tagged = engine.get_with_tag(URL, "3x2").await.unwrap();
        assert_eq!((tagged.width(), tagged.height()), (3, 2));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_get_resized_rejects_zero_size() {
        let dir = TempDir::new().unwrap();
        let (engine, transport) = open_engine(&dir, Ok(png(&translucent(10)))).await;

        assert!(matches!(
            engine.get_resized(URL, 0, 10).await,
            Err(CacheError::Encode(_))
        ));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_index() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = open_engine(&dir, Ok(png(&translucent(10)))).await;
        engine.get(URL).await.unwrap();

        engine.shutdown().await.unwrap();
        engine.shutdown().await.unwrap();

        let index = std::fs::read_to_string(dir.path().join("telescope.json")).unwrap();
        assert!(index.contains(URL));
        assert!(index.contains(CacheKey::derive(URL, None).as_str()));
    }

    #[tokio::test]
    async fn test_policy_accessors_via_trait() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = open_engine(&dir, Ok(Vec::new())).await;
        let cache: &dyn Cache = &engine;

        assert_eq!(cache.ttl(), crate::config::DEFAULT_TTL);
        assert_eq!(cache.format_policy(), FormatPolicy::default());
    }

    #[test]
    fn test_empty_tag_is_canonical() {
        assert!(is_canonical(None));
        assert!(is_canonical(Some("")));
        assert!(!is_canonical(Some("t1")));
    }
}
