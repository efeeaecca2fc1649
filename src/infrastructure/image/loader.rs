//! Async image loading orchestrator.
//!
//! Implements a three-tier cache: Memory -> Disk -> Network. Concurrent
//! loads of a URL that is already being fetched join the running fetch
//! instead of starting a second one.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::domain::entities::{ImageId, ImageSource, LoadedImage};
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::ports::{ByteFetcher, ImageCachePort};
use crate::infrastructure::cache::CacheStats;
use crate::infrastructure::worker::panic_message;

use super::disk_cache::{DEFAULT_MAX_CACHE_SIZE, DiskImageCache};
use super::memory_cache::{DEFAULT_CACHE_SIZE, MemoryImageCache};

/// Notification emitted once per network fetch.
#[derive(Debug, Clone)]
pub enum ResourceEvent {
    /// The fetch succeeded and the image is now cached.
    Loaded {
        /// Requested URL.
        url: String,
        /// The decoded image.
        image: LoadedImage,
    },
    /// The fetch or decode failed; nothing was cached.
    Failed {
        /// Requested URL.
        url: String,
        /// Why the load failed.
        reason: FetchError,
    },
}

impl ResourceEvent {
    /// URL the event refers to.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Loaded { url, .. } | Self::Failed { url, .. } => url,
        }
    }
}

/// Receives the image once a deferred load completes.
///
/// The sender is dropped without a value when the load fails.
pub type LoadCallback = oneshot::Sender<LoadedImage>;

/// Configuration for the image loader.
#[derive(Debug, Clone)]
pub struct ImageLoaderConfig {
    /// Maximum images in memory cache.
    pub memory_cache_size: usize,
    /// Maximum disk cache size in bytes.
    pub disk_cache_size: u64,
    /// Directory for the disk tier.
    pub cache_dir: PathBuf,
}

impl Default for ImageLoaderConfig {
    fn default() -> Self {
        Self {
            memory_cache_size: DEFAULT_CACHE_SIZE,
            disk_cache_size: DEFAULT_MAX_CACHE_SIZE,
            cache_dir: super::disk_cache::dirs_cache_path(),
        }
    }
}

type InFlight = Arc<Mutex<HashMap<String, Vec<LoadCallback>>>>;

/// Orchestrates image loading from memory, disk, and network.
pub struct ImageLoader {
    memory_cache: Arc<MemoryImageCache>,
    disk_cache: Arc<DiskImageCache>,
    fetcher: Arc<dyn ByteFetcher>,
    in_flight: InFlight,
    event_tx: mpsc::UnboundedSender<ResourceEvent>,
    config: ImageLoaderConfig,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("config", &self.config)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader over an existing disk cache.
    #[must_use]
    pub fn new(
        config: ImageLoaderConfig,
        fetcher: Arc<dyn ByteFetcher>,
        event_tx: &mpsc::UnboundedSender<ResourceEvent>,
        disk_cache: Arc<DiskImageCache>,
    ) -> Self {
        let memory_cache = Arc::new(MemoryImageCache::new(config.memory_cache_size));
        Self {
            memory_cache,
            disk_cache,
            fetcher,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            event_tx: event_tx.clone(),
            config,
        }
    }

    /// Creates a loader, opening the disk cache named in `config`.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be created.
    pub async fn open(
        config: ImageLoaderConfig,
        fetcher: Arc<dyn ByteFetcher>,
        event_tx: &mpsc::UnboundedSender<ResourceEvent>,
    ) -> FetchResult<Self> {
        let disk_cache =
            Arc::new(DiskImageCache::new(config.cache_dir.clone(), config.disk_cache_size).await?);
        Ok(Self::new(config, fetcher, event_tx, disk_cache))
    }

    /// Checks memory cache without promoting the entry.
    pub async fn check_memory_cache(&self, url: &str) -> Option<Arc<image::DynamicImage>> {
        self.memory_cache.peek(&ImageId::from_url(url)).await
    }

    /// Loads an image, checking caches first.
    ///
    /// Memory and disk hits are returned directly and also handed to
    /// `callback`. On a miss this returns `None` and the network result
    /// reaches `callback` (and the event channel) later.
    pub async fn load(&self, url: &str, callback: Option<LoadCallback>) -> Option<LoadedImage> {
        let id = ImageId::from_url(url);

        if let Some(img) = self.memory_cache.get(&id).await {
            return Some(Self::deliver(url, img, ImageSource::MemoryCache, callback));
        }

        if let Some(img) = self.disk_cache.get(url).await {
            self.memory_cache.put(id, img.clone()).await;
            debug!(url, "Promoted disk cache hit to memory");
            return Some(Self::deliver(url, img, ImageSource::DiskCache, callback));
        }

        let start_fetch = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.entry(url.to_string()) {
                Entry::Occupied(mut waiters) => {
                    waiters.get_mut().extend(callback);
                    false
                }
                Entry::Vacant(slot) => {
                    slot.insert(callback.into_iter().collect());
                    true
                }
            }
        };

        if start_fetch {
            debug!(url, "Downloading image from network");
            let handle = self.handle();
            let url = url.to_string();
            tokio::spawn(async move { handle.fetch_and_store(url).await });
        } else {
            trace!(url, "Joined in-flight fetch");
        }

        None
    }

    fn deliver(
        url: &str,
        image: Arc<image::DynamicImage>,
        source: ImageSource,
        callback: Option<LoadCallback>,
    ) -> LoadedImage {
        let loaded = LoadedImage {
            url: url.to_string(),
            image,
            source,
        };
        if let Some(cb) = callback {
            let _ = cb.send(loaded.clone());
        }
        loaded
    }

    fn handle(&self) -> ImageLoaderHandle {
        ImageLoaderHandle {
            memory_cache: self.memory_cache.clone(),
            disk_cache: self.disk_cache.clone(),
            fetcher: self.fetcher.clone(),
            in_flight: self.in_flight.clone(),
            event_tx: self.event_tx.clone(),
        }
    }

    /// Returns true if a network fetch for `url` is running.
    #[must_use]
    pub fn is_loading(&self, url: &str) -> bool {
        self.in_flight.lock().contains_key(url)
    }

    /// Returns the number of URLs being fetched.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Returns memory cache statistics.
    #[must_use]
    pub fn memory_cache_stats(&self) -> CacheStats {
        self.memory_cache.stats()
    }

    /// The disk tier.
    #[must_use]
    pub fn disk_cache(&self) -> &DiskImageCache {
        &self.disk_cache
    }

    /// Drops every decoded image held in memory.
    pub async fn clear_memory(&self) {
        self.memory_cache.clear().await;
    }

    /// Removes every cached file, skipping files that cannot be removed.
    pub async fn clear_disk(&self) {
        if let Err(e) = self.disk_cache.clear().await {
            warn!(error = %e, "Failed to clear disk cache");
        }
    }

    /// Clears all caches.
    pub async fn clear_all(&self) {
        self.clear_memory().await;
        self.clear_disk().await;
        info!("Cleared all image caches");
    }
}

/// Decodes image bytes off the async executor.
pub(super) async fn decode_image(bytes: Bytes) -> FetchResult<image::DynamicImage> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| FetchError::internal(format!("Decode task panicked: {e}")))?
        .map_err(|e| FetchError::decode(format!("Failed to decode image: {e}")))
}

/// Internal handle for async loading tasks.
struct ImageLoaderHandle {
    memory_cache: Arc<MemoryImageCache>,
    disk_cache: Arc<DiskImageCache>,
    fetcher: Arc<dyn ByteFetcher>,
    in_flight: InFlight,
    event_tx: mpsc::UnboundedSender<ResourceEvent>,
}

impl ImageLoaderHandle {
    async fn fetch_and_store(self, url: String) {
        let outcome = AssertUnwindSafe(self.fetch_decoded(&url))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!(url = %url, panic = %message, "Image fetch panicked");
                Err(FetchError::internal(format!("image fetch panicked: {message}")))
            });

        match outcome {
            Ok(img) => {
                let waiters = self.in_flight.lock().remove(&url).unwrap_or_default();
                let loaded = LoadedImage {
                    url: url.clone(),
                    image: img,
                    source: ImageSource::Network,
                };
                debug!(url = %url, waiters = waiters.len(), "Image loaded from network");
                for waiter in waiters {
                    let _ = waiter.send(loaded.clone());
                }
                let _ = self.event_tx.send(ResourceEvent::Loaded {
                    url,
                    image: loaded,
                });
            }
            Err(e) => {
                let waiters = self.in_flight.lock().remove(&url).unwrap_or_default();
                warn!(url = %url, error = %e, waiters = waiters.len(), "Image load failed");
                drop(waiters);
                let _ = self.event_tx.send(ResourceEvent::Failed { url, reason: e });
            }
        }
    }

    /// Fetches, decodes and caches one image in both tiers.
    async fn fetch_decoded(&self, url: &str) -> FetchResult<Arc<image::DynamicImage>> {
        let bytes = self.fetcher.fetch(url).await?;
        let img = Arc::new(decode_image(bytes.clone()).await?);

        if let Err(e) = self.disk_cache.put_bytes(url, &bytes).await {
            warn!(url, error = %e, "Failed to cache to disk");
        }
        self.memory_cache.put(ImageId::from_url(url), img.clone()).await;

        Ok(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::MockByteFetcher;
    use std::time::Duration;
    use tempfile::TempDir;

    const URL: &str = "https://cdn.example.com/covers/1.png";

    fn png_bytes() -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::new_rgb8(8, 6)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    async fn loader_with(
        fetcher: Arc<MockByteFetcher>,
    ) -> (ImageLoader, mpsc::UnboundedReceiver<ResourceEvent>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let config = ImageLoaderConfig {
            memory_cache_size: 4,
            disk_cache_size: 1024 * 1024,
            cache_dir: temp_dir.path().to_path_buf(),
        };
        let loader = ImageLoader::open(config, fetcher, &tx).await.unwrap();
        (loader, rx, temp_dir)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ResourceEvent>) -> ResourceEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let fetcher = Arc::new(MockByteFetcher::new().with_body(URL, png_bytes()).gated());
        let (loader, mut rx, _temp) = loader_with(fetcher.clone()).await;

        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        assert!(loader.load(URL, Some(tx_a)).await.is_none());
        assert!(loader.load(URL, Some(tx_b)).await.is_none());
        assert!(loader.is_loading(URL));
        assert_eq!(loader.pending_count(), 1);

        while fetcher.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        fetcher.release();

        let a = tokio::time::timeout(Duration::from_secs(5), rx_a).await.unwrap().unwrap();
        let b = tokio::time::timeout(Duration::from_secs(5), rx_b).await.unwrap().unwrap();
        assert!(a.same_image(&b));
        assert_eq!(a.source, ImageSource::Network);
        assert_eq!(fetcher.calls(), 1);

        assert!(matches!(next_event(&mut rx).await, ResourceEvent::Loaded { .. }));
        assert!(!loader.is_loading(URL));
    }

    #[tokio::test]
    async fn test_network_result_populates_both_tiers() {
        let fetcher = Arc::new(MockByteFetcher::new().with_body(URL, png_bytes()));
        let (loader, mut rx, _temp) = loader_with(fetcher.clone()).await;

        assert!(loader.load(URL, None).await.is_none());
        let event = next_event(&mut rx).await;
        assert_eq!(event.url(), URL);

        assert!(loader.disk_cache().contains(URL).await);
        let hit = loader.load(URL, None).await.unwrap();
        assert_eq!(hit.source, ImageSource::MemoryCache);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_memory_hit_invokes_callback() {
        let fetcher = Arc::new(MockByteFetcher::new().with_body(URL, png_bytes()));
        let (loader, mut rx, _temp) = loader_with(fetcher).await;
        loader.load(URL, None).await;
        next_event(&mut rx).await;

        let (tx, cb_rx) = oneshot::channel();
        let direct = loader.load(URL, Some(tx)).await.unwrap();
        let via_callback = cb_rx.await.unwrap();
        assert!(direct.same_image(&via_callback));
    }

    #[tokio::test]
    async fn test_disk_hit_after_memory_clear() {
        let fetcher = Arc::new(MockByteFetcher::new().with_body(URL, png_bytes()));
        let (loader, mut rx, _temp) = loader_with(fetcher.clone()).await;
        loader.load(URL, None).await;
        next_event(&mut rx).await;

        loader.clear_memory().await;
        let hit = loader.load(URL, None).await.unwrap();

        assert_eq!(hit.source, ImageSource::DiskCache);
        assert_eq!(hit.image.width(), 8);
        assert!(loader.check_memory_cache(URL).await.is_some());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_disk_entry_falls_through_to_network() {
        let fetcher = Arc::new(MockByteFetcher::new().with_body(URL, png_bytes()));
        let (loader, mut rx, _temp) = loader_with(fetcher.clone()).await;
        loader.disk_cache().put_bytes(URL, b"garbage").await.unwrap();

        assert!(loader.load(URL, None).await.is_none());
        assert!(matches!(next_event(&mut rx).await, ResourceEvent::Loaded { .. }));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_caches_nothing() {
        let fetcher = Arc::new(MockByteFetcher::new().with_body(URL, &b"<html>denied</html>"[..]));
        let (loader, mut rx, _temp) = loader_with(fetcher).await;

        let (tx, cb_rx) = oneshot::channel();
        loader.load(URL, Some(tx)).await;

        match next_event(&mut rx).await {
            ResourceEvent::Failed { reason, .. } => {
                assert!(matches!(reason, FetchError::Decode { .. }));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(cb_rx.await.is_err());
        assert!(!loader.disk_cache().contains(URL).await);
        assert!(loader.check_memory_cache(URL).await.is_none());
    }

    #[tokio::test]
    async fn test_failure_allows_retry() {
        let fetcher = Arc::new(MockByteFetcher::new());
        let (loader, mut rx, _temp) = loader_with(fetcher.clone()).await;

        loader.load(URL, None).await;
        assert!(matches!(
            next_event(&mut rx).await,
            ResourceEvent::Failed {
                reason: FetchError::Http { status: 404 },
                ..
            }
        ));
        assert_eq!(loader.pending_count(), 0);

        loader.load(URL, None).await;
        next_event(&mut rx).await;
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_panicking_fetch_releases_url() {
        let fetcher = Arc::new(MockByteFetcher::new().with_panic(URL));
        let (loader, mut rx, _temp) = loader_with(fetcher.clone()).await;

        let (tx, cb_rx) = oneshot::channel();
        assert!(loader.load(URL, Some(tx)).await.is_none());

        match next_event(&mut rx).await {
            ResourceEvent::Failed { url, reason } => {
                assert_eq!(url, URL);
                assert!(matches!(reason, FetchError::Internal { .. }));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(cb_rx.await.is_err());
        assert!(!loader.is_loading(URL));

        loader.load(URL, None).await;
        assert!(matches!(next_event(&mut rx).await, ResourceEvent::Failed { .. }));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_disk() {
        let fetcher = Arc::new(MockByteFetcher::new().with_body(URL, png_bytes()));
        let (loader, mut rx, _temp) = loader_with(fetcher).await;
        loader.load(URL, None).await;
        next_event(&mut rx).await;

        loader.clear_disk().await;
        assert!(loader.disk_cache().is_empty());
        assert!(loader.check_memory_cache(URL).await.is_some());
    }
}
