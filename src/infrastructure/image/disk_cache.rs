//! Disk-based image cache for persistence across sessions.
//!
//! One file per URL, named `<hash(url)>.<ext>`. The extension comes from the
//! URL's last path segment when it is a known image type, `jpg` otherwise.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use super::loader::decode_image;
use crate::domain::entities::ImageId;
use crate::domain::errors::{FetchError, FetchResult};

/// Maximum disk cache size in bytes (100 MB default).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 100 * 1024 * 1024;

/// Extensions kept as-is in cache file names.
pub const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Extension used when the URL does not name a known image type.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Infers the cache file extension of `url`.
#[must_use]
pub fn infer_extension(url: &str) -> &'static str {
    let last_segment = url::Url::parse(url).map_or_else(
        |_| {
            let path = url.split(['?', '#']).next().unwrap_or_default();
            path.rsplit('/').next().unwrap_or_default().to_string()
        },
        |parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(String::from))
                .unwrap_or_default()
        },
    );

    last_segment
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .and_then(|ext| KNOWN_EXTENSIONS.iter().find(|known| **known == ext).copied())
        .unwrap_or(DEFAULT_EXTENSION)
}

fn is_cache_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| KNOWN_EXTENSIONS.contains(&ext))
}

/// Disk-based image cache that persists raw image bytes.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    max_size: u64,
    current_size: AtomicU64,
    item_count: AtomicUsize,
}

impl DiskImageCache {
    /// Creates a new disk cache in the specified directory.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created.
    pub async fn new(cache_dir: PathBuf, max_size: u64) -> FetchResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| FetchError::filesystem(format!("Failed to create cache dir: {e}")))?;
        let mut total_size = 0u64;
        let mut count = 0usize;

        let mut entries = fs::read_dir(&cache_dir)
            .await
            .map_err(|e| FetchError::filesystem(format!("Failed to read cache dir: {e}")))?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            if is_cache_file(&entry.path())
                && let Ok(meta) = entry.metadata().await
            {
                total_size += meta.len();
                count += 1;
            }
        }

        let cache = Self {
            cache_dir,
            max_size,
            current_size: AtomicU64::new(total_size),
            item_count: AtomicUsize::new(count),
        };

        cache.cleanup_if_needed().await;

        Ok(cache)
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path a cached copy of `url` lives at.
    #[must_use]
    pub fn cache_path(&self, url: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", ImageId::from_url(url), infer_extension(url)))
    }

    /// Gets raw image bytes from disk cache.
    pub async fn get_bytes(&self, url: &str) -> Option<Bytes> {
        let path = self.cache_path(url);
        if let Ok(bytes) = fs::read(&path).await {
            trace!(url, path = %path.display(), "Disk cache hit");
            Some(Bytes::from(bytes))
        } else {
            trace!(url, "Disk cache miss");
            None
        }
    }

    /// Loads and decodes an image from disk cache.
    ///
    /// Entries that fail to decode are removed and reported as a miss.
    pub async fn get(&self, url: &str) -> Option<Arc<image::DynamicImage>> {
        let bytes = self.get_bytes(url).await?;

        match decode_image(bytes).await {
            Ok(img) => {
                debug!(url, "Decoded image from disk cache");
                Some(Arc::new(img))
            }
            Err(e) => {
                warn!(url, error = %e, "Discarding corrupt disk cache entry");
                self.evict(url).await;
                None
            }
        }
    }

    /// Stores raw bytes in the disk cache.
    ///
    /// # Errors
    /// Returns error if file cannot be created or written.
    pub async fn put_bytes(&self, url: &str, bytes: &[u8]) -> FetchResult<()> {
        let path = self.cache_path(url);

        let old_size = fs::metadata(&path).await.map(|m| m.len()).ok();

        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| FetchError::filesystem(format!("Failed to create cache file: {e}")))?;

        file.write_all(bytes)
            .await
            .map_err(|e| FetchError::filesystem(format!("Failed to write cache file: {e}")))?;

        file.flush()
            .await
            .map_err(|e| FetchError::filesystem(format!("Failed to flush cache file: {e}")))?;

        let new_size = bytes.len() as u64;
        if let Some(old) = old_size {
            if new_size > old {
                self.current_size
                    .fetch_add(new_size - old, Ordering::Relaxed);
            } else {
                self.current_size
                    .fetch_sub(old - new_size, Ordering::Relaxed);
            }
        } else {
            self.current_size.fetch_add(new_size, Ordering::Relaxed);
            self.item_count.fetch_add(1, Ordering::Relaxed);
        }

        debug!(url, path = %path.display(), size = bytes.len(), "Stored image in disk cache");

        self.cleanup_if_needed().await;

        Ok(())
    }

    /// Removes an image from disk cache.
    pub async fn evict(&self, url: &str) {
        let path = self.cache_path(url);
        let size = fs::metadata(&path).await.map(|m| m.len()).ok();
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(url, error = %e, "Failed to evict from disk cache");
            }
        } else if let Some(s) = size {
            self.current_size.fetch_sub(s, Ordering::Relaxed);
            self.item_count.fetch_sub(1, Ordering::Relaxed);
            debug!(url, "Evicted from disk cache");
        }
    }

    /// Clears the entire disk cache, skipping files that cannot be removed.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be read.
    pub async fn clear(&self) -> FetchResult<()> {
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| FetchError::filesystem(format!("Failed to read cache dir: {e}")))?;

        let mut remaining_size = 0u64;
        let mut remaining_count = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_cache_file(&path) {
                continue;
            }
            let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove cache file");
                remaining_size += size;
                remaining_count += 1;
            }
        }
        self.current_size.store(remaining_size, Ordering::Relaxed);
        self.item_count.store(remaining_count, Ordering::Relaxed);
        debug!(remaining = remaining_count, "Cleared disk cache");
        Ok(())
    }

    /// Returns the current cache size in bytes.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Returns the number of cached files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.item_count.load(Ordering::Relaxed)
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if an image is cached.
    pub async fn contains(&self, url: &str) -> bool {
        fs::try_exists(self.cache_path(url)).await.unwrap_or(false)
    }

    /// Cleans up old cache entries if over size limit.
    async fn cleanup_if_needed(&self) {
        let current_size = self.current_size();
        if current_size <= self.max_size {
            return;
        }

        debug!(
            current_size = current_size,
            max_size = self.max_size,
            "Disk cache over limit, cleaning up"
        );

        let Ok(mut entries) = fs::read_dir(&self.cache_dir).await else {
            return;
        };

        let mut files: Vec<(PathBuf, std::time::SystemTime, u64)> = Vec::new();

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_cache_file(&path) {
                continue;
            }

            if let Ok(meta) = entry.metadata().await {
                let touched = meta
                    .accessed()
                    .or_else(|_| meta.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                files.push((path, touched, meta.len()));
            }
        }

        files.sort_by_key(|(_, time, _)| *time);

        let mut freed_size = 0u64;
        let mut freed_count = 0usize;
        let target = current_size - self.max_size + (self.max_size / 10);

        for (path, _, size) in files {
            if freed_size >= target {
                break;
            }

            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove old cache file");
            } else {
                trace!(path = %path.display(), "Removed old cache file");
                freed_size += size;
                freed_count += 1;
            }
        }
        self.current_size.fetch_sub(freed_size, Ordering::Relaxed);
        self.item_count.fetch_sub(freed_count, Ordering::Relaxed);

        debug!(
            freed_size = freed_size,
            freed_count = freed_count,
            "Disk cache cleanup complete"
        );
    }
}

/// Returns the default cache directory path.
#[must_use]
pub fn dirs_cache_path() -> PathBuf {
    directories::ProjectDirs::from("com", "dramadeck", "dramadeck").map_or_else(
        || {
            std::env::temp_dir()
                .join("dramadeck")
                .join("cache")
                .join("images")
        },
        |dirs| dirs.cache_dir().join("images"),
    )
}
