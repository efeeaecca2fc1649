//! Infrastructure layer with external service adapters.

/// Expiring key-value cache.
pub mod cache;
/// Application configuration.
pub mod config;
/// HTTP adapters.
pub mod http;
/// Image handling (caching, loading).
pub mod image;
/// Isolated worker threads.
pub mod worker;

pub use cache::{CacheStats, TtlCache};
pub use config::{AppConfig, CliArgs, Command, ConfigStore, LogLevel};
pub use http::{CatalogApiClient, HttpFetcher, HttpMediaSource, RetryPolicy};
pub use image::{DiskImageCache, ImageLoader, ImageLoaderConfig, MemoryImageCache, ResourceEvent};
pub use worker::{ActiveRequest, IsolatedThread, StopOutcome, TaskWorker, Ticket, WorkerEvent};
