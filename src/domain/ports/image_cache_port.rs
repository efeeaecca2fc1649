//! Port definition for image caching.

use std::sync::Arc;

use crate::domain::entities::ImageId;

/// Port for in-memory image caching operations.
/// Implementations must be thread-safe.
#[async_trait::async_trait]
pub trait ImageCachePort: Send + Sync {
    /// Attempts to get an image from the cache, promoting it on hit.
    /// Returns None if not cached.
    async fn get(&self, id: &ImageId) -> Option<Arc<image::DynamicImage>>;

    /// Stores an image in the cache, evicting the least recently used entry
    /// when full.
    async fn put(&self, id: ImageId, image: Arc<image::DynamicImage>);

    /// Removes an image from the cache.
    async fn evict(&self, id: &ImageId);

    /// Returns the current number of cached images.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all images from the cache.
    async fn clear(&self);
}
