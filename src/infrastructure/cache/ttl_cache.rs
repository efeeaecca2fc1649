//! Key/value cache with per-entry expiry.
//!
//! Entries expire lazily: an expired entry is dropped by the first `get` or
//! `remove` that observes it, or by an explicit `cleanup_expired`. There is no
//! background sweeper. Capacity is bounded and the least recently used entry
//! is evicted first.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use super::stats::CacheStats;

/// Default time-to-live (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default maximum number of live entries.
pub const DEFAULT_MAX_ENTRIES: usize = 500;

/// A cached value with its creation time and lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    /// Expired once strictly more than `ttl` has elapsed since creation.
    fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

struct Inner<V> {
    entries: LruCache<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
}

/// Thread-safe TTL cache guarded by a single lock.
pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
    default_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    /// Creates a cache holding at most `max_entries` values.
    #[must_use]
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(cap),
                hits: 0,
                misses: 0,
            }),
            default_ttl,
        }
    }

    /// Returns the lifetime used by [`Self::set`].
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Stores `value` with the default lifetime.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Stores `value`, replacing any previous entry for `key`.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut inner = self.inner.lock();
        if let Some((evicted, _)) = inner.entries.push(key.clone(), CacheEntry::new(value, ttl))
            && evicted != key
        {
            debug!(key = %evicted, "Evicted least recently used cache entry");
        }
    }

    /// Returns the live value for `key`, dropping it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                let value = entry.value.clone();
                inner.hits += 1;
                trace!(key, "TTL cache hit");
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.pop(key);
            trace!(key, "TTL cache entry expired");
        }
        inner.misses += 1;
        None
    }

    /// Removes `key`. Returns true if a live entry was removed.
    pub fn remove(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .pop(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Drops every entry and resets statistics.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        debug!("Cleared TTL cache");
    }

    /// Drops all expired entries, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.entries.pop(key);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Purged expired cache entries");
        }
        expired.len()
    }

    /// Number of stored entries, including expired ones not yet observed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns hit/miss statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats::from_counters(inner.hits, inner.misses, inner.entries.len())
    }
}

impl<V> TtlCache<V> {
    /// Derives a fixed-length key from request parts.
    ///
    /// Each part is length-prefixed before hashing so `["a:b", "c"]` and
    /// `["a", "b:c"]` never share a key.
    #[must_use]
    pub fn derive_key<S: AsRef<str>>(parts: &[S]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            let part = part.as_ref();
            hasher.update(part.len().to_string().as_bytes());
            hasher.update(b":");
            hasher.update(part.as_bytes());
        }
        hex::encode(&hasher.finalize()[..16])
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}
