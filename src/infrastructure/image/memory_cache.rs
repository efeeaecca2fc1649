//! In-memory LRU image cache implementation.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::domain::entities::ImageId;
use crate::domain::ports::ImageCachePort;
use crate::infrastructure::cache::CacheStats;

/// Default maximum number of images to cache in memory.
pub const DEFAULT_CACHE_SIZE: usize = 50;

/// In-memory LRU cache for decoded images.
/// Thread-safe and optimized for frequent reads.
pub struct MemoryImageCache {
    cache: RwLock<LruCache<ImageId, Arc<image::DynamicImage>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache with the specified capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(cap)),
            capacity: cap.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default capacity.
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }

    /// Maximum number of images held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats::from_counters(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.len(),
        )
    }

    /// Peeks at an image without promoting it in the LRU.
    pub async fn peek(&self, id: &ImageId) -> Option<Arc<image::DynamicImage>> {
        let cache = self.cache.read().await;
        cache.peek(id).cloned()
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait::async_trait]
impl ImageCachePort for MemoryImageCache {
    async fn get(&self, id: &ImageId) -> Option<Arc<image::DynamicImage>> {
        let mut cache = self.cache.write().await;
        if let Some(img) = cache.get(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(id = %id, "Memory cache hit");
            Some(img.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(id = %id, "Memory cache miss");
            None
        }
    }

    async fn put(&self, id: ImageId, image: Arc<image::DynamicImage>) {
        let mut cache = self.cache.write().await;
        if let Some((evicted, _)) = cache.push(id.clone(), image)
            && evicted != id
        {
            debug!(id = %evicted, "Evicted least recently used image");
        }
    }

    async fn evict(&self, id: &ImageId) {
        let mut cache = self.cache.write().await;
        if cache.pop(id).is_some() {
            debug!(id = %id, "Evicted image from memory cache");
        }
    }

    fn len(&self) -> usize {
        // Best-effort: a concurrent writer makes this report 0.
        self.cache.try_read().map(|c| c.len()).unwrap_or(0)
    }

    async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
        debug!("Cleared memory image cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img() -> Arc<image::DynamicImage> {
        Arc::new(image::DynamicImage::new_rgb8(10, 10))
    }

    #[tokio::test]
    async fn test_cache_put_and_get() {
        let cache = MemoryImageCache::new(10);
        let id = ImageId::new("test1");
        let image = Arc::new(image::DynamicImage::new_rgb8(100, 100));

        cache.put(id.clone(), image.clone()).await;
        let retrieved = cache.get(&id).await;

        assert!(retrieved.is_some_and(|r| Arc::ptr_eq(&r, &image)));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = MemoryImageCache::new(10);
        assert!(cache.get(&ImageId::new("nonexistent")).await.is_none());
    }

    #[tokio::test]
    async fn test_capacity_plus_one_evicts_least_recently_touched() {
        let cache = MemoryImageCache::new(3);
        let ids: Vec<_> = (0..4).map(|i| ImageId::new(format!("img{i}"))).collect();

        for id in &ids[..3] {
            cache.put(id.clone(), img()).await;
        }
        // img0 is touched, so img1 is now least recently used.
        assert!(cache.get(&ids[0]).await.is_some());
        cache.put(ids[3].clone(), img()).await;

        assert_eq!(cache.len(), 3);
        assert!(cache.peek(&ids[1]).await.is_none());
        assert!(cache.peek(&ids[0]).await.is_some());
        assert!(cache.peek(&ids[2]).await.is_some());
        assert!(cache.peek(&ids[3]).await.is_some());
    }

    #[tokio::test]
    async fn test_reinsert_promotes_without_growing() {
        let cache = MemoryImageCache::new(2);
        let a = ImageId::new("a");
        let b = ImageId::new("b");
        cache.put(a.clone(), img()).await;
        cache.put(b.clone(), img()).await;
        cache.put(a.clone(), img()).await;
        cache.put(ImageId::new("c"), img()).await;

        assert_eq!(cache.len(), 2);
        assert!(cache.peek(&a).await.is_some());
        assert!(cache.peek(&b).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = MemoryImageCache::new(10);
        let id = ImageId::new("test1");
        cache.put(id.clone(), img()).await;

        let _ = cache.get(&id).await;
        let _ = cache.get(&ImageId::new("missing")).await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new(2);
        let id1 = ImageId::new("test1");
        let id2 = ImageId::new("test2");

        cache.put(id1.clone(), img()).await;
        cache.put(id2.clone(), img()).await;
        let _ = cache.peek(&id1).await;
        cache.put(ImageId::new("test3"), img()).await;

        assert!(cache.peek(&id1).await.is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryImageCache::new(4);
        cache.put(ImageId::new("a"), img()).await;
        cache.clear().await;
        assert!(cache.is_empty());
    }
}
