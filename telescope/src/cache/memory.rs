//! In-memory tier holding decoded images.
//!
//! Backed by `moka`, weighted by decoded pixel bytes. Eviction is entirely the
//! store's own business: a `put` never guarantees a later `get` hits.

use moka::future::Cache as MokaCache;

use crate::cache::CacheKey;
use crate::codec::CachedImage;

/// Bounded, concurrently accessible map from cache key to decoded image.
#[derive(Clone)]
pub struct MemoryTier {
    cache: MokaCache<CacheKey, CachedImage>,
    max_size_bytes: u64,
}

impl MemoryTier {
    /// Create a memory tier holding up to `max_size_bytes` of decoded pixels.
    pub fn new(max_size_bytes: u64) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(max_size_bytes)
            .weigher(|_key: &CacheKey, image: &CachedImage| {
                u32::try_from(image.as_bytes().len()).unwrap_or(u32::MAX)
            })
            .build();

        Self {
            cache,
            max_size_bytes,
        }
    }

    /// Look up an image.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedImage> {
        self.cache.get(key).await
    }

    /// Store an image, replacing any previous value for the key.
    pub async fn put(&self, key: CacheKey, image: CachedImage) {
        self.cache.insert(key, image).await;
    }

    /// Drop an entry if present.
    pub async fn remove(&self, key: &CacheKey) {
        self.cache.invalidate(key).await;
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Approximate total weight (decoded bytes) of the entries.
    pub fn weighted_size(&self) -> u64 {
        self.cache.weighted_size()
    }

    /// Configured capacity in bytes.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Apply pending maintenance so counters reflect recent writes.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::sync::Arc;

    fn image(side: u32) -> CachedImage {
        Arc::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            side,
            side,
            Rgba([1, 2, 3, 255]),
        )))
    }

    fn key(n: u32) -> CacheKey {
        CacheKey::derive(&format!("https://example.com/{n}.png"), None)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let tier = MemoryTier::new(1024 * 1024);
        tier.put(key(1), image(4)).await;

        let hit = tier.get(&key(1)).await;
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().width(), 4);
    }

    #[tokio::test]
    async fn test_miss() {
        let tier = MemoryTier::new(1024 * 1024);
        assert!(tier.get(&key(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let tier = MemoryTier::new(1024 * 1024);
        tier.put(key(1), image(4)).await;
        tier.remove(&key(1)).await;
        assert!(tier.get(&key(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let tier = MemoryTier::new(1024 * 1024);
        tier.put(key(1), image(4)).await;
        tier.put(key(2), image(4)).await;

        tier.clear();
        tier.sync().await;

        assert!(tier.get(&key(1)).await.is_none());
        assert!(tier.get(&key(2)).await.is_none());
        assert_eq!(tier.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_weight_tracks_pixel_bytes() {
        let tier = MemoryTier::new(1024 * 1024);
        tier.put(key(1), image(8)).await;
        tier.sync().await;

        // 8 x 8 RGBA
        assert_eq!(tier.weighted_size(), 256);
        assert_eq!(tier.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        // Room for roughly two 16x16 RGBA images (1 KiB each)
        let tier = MemoryTier::new(2048);
        for n in 0..10 {
            tier.put(key(n), image(16)).await;
        }
        tier.sync().await;

        assert_eq!(tier.max_size_bytes(), 2048);
        assert!(tier.weighted_size() <= 2048);
    }

    #[tokio::test]
    async fn test_replace_existing() {
        let tier = MemoryTier::new(1024 * 1024);
        tier.put(key(1), image(4)).await;
        tier.put(key(1), image(6)).await;

        assert_eq!(tier.get(&key(1)).await.unwrap().width(), 6);
    }
}
