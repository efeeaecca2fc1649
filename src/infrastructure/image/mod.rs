//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction
//! - Disk caching for persistence
//! - Async image loading pipeline with in-flight deduplication

pub mod disk_cache;
pub mod loader;
pub mod memory_cache;

pub use disk_cache::{DiskImageCache, infer_extension};
pub use loader::{ImageLoader, ImageLoaderConfig, LoadCallback, ResourceEvent};
pub use memory_cache::MemoryImageCache;
