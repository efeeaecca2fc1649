//! Application configuration.

use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::args::CliArgs;
use crate::infrastructure::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::infrastructure::http::{DEFAULT_API_BASE, RetryPolicy};
use crate::infrastructure::image::ImageLoaderConfig;
use crate::infrastructure::image::disk_cache::{DEFAULT_MAX_CACHE_SIZE, dirs_cache_path};
use crate::infrastructure::image::memory_cache::DEFAULT_CACHE_SIZE;

const APP_NAME: &str = "dramadeck";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "dramadeck";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, read from `config.toml` and overridden by CLI
/// flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Metadata cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Image cache tiers.
    #[serde(default)]
    pub images: ImagesConfig,

    /// Downloads.
    #[serde(default)]
    pub downloads: DownloadsConfig,

    /// Upstream API.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Metadata cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live of an entry in milliseconds.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Maximum number of entries.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl CacheConfig {
    /// Entry time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            max_entries: default_max_entries(),
        }
    }
}

/// Image cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Decoded images kept in memory.
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,

    /// Byte budget of the disk cache.
    #[serde(default = "default_disk_max_bytes")]
    pub disk_max_bytes: u64,

    /// Disk cache directory override.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl ImagesConfig {
    /// Builds the loader configuration.
    #[must_use]
    pub fn loader_config(&self) -> ImageLoaderConfig {
        ImageLoaderConfig {
            memory_cache_size: self.memory_capacity,
            disk_cache_size: self.disk_max_bytes,
            cache_dir: self.cache_dir.clone().unwrap_or_else(dirs_cache_path),
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            memory_capacity: default_memory_capacity(),
            disk_max_bytes: default_disk_max_bytes(),
            cache_dir: None,
        }
    }
}

/// Download configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadsConfig {
    /// Download directory override.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Requested stream quality.
    #[serde(default = "default_quality")]
    pub quality: String,

    /// Time a cancelled batch gets to stop, in milliseconds.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

impl DownloadsConfig {
    /// Effective download directory.
    #[must_use]
    pub fn effective_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(AppConfig::default_download_dir)
    }

    /// Cancellation grace period.
    #[must_use]
    pub const fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            quality: default_quality(),
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Catalog API endpoint.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Timeout of metadata requests in seconds.
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,

    /// Timeout of a whole media transfer in seconds.
    #[serde(default = "default_media_timeout_secs")]
    pub media_timeout_secs: u64,

    /// Retries of failed metadata requests.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl NetworkConfig {
    /// Metadata request timeout.
    #[must_use]
    pub const fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    /// Media transfer timeout.
    #[must_use]
    pub const fn media_timeout(&self) -> Duration {
        Duration::from_secs(self.media_timeout_secs)
    }

    /// Retry policy for metadata requests.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_retries(self.max_retries)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            metadata_timeout_secs: default_metadata_timeout_secs(),
            media_timeout_secs: default_media_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn default_ttl_ms() -> u64 {
    DEFAULT_TTL.as_millis() as u64
}

const fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

const fn default_memory_capacity() -> usize {
    DEFAULT_CACHE_SIZE
}

const fn default_disk_max_bytes() -> u64 {
    DEFAULT_MAX_CACHE_SIZE
}

fn default_quality() -> String {
    "1080p".to_string()
}

const fn default_cancel_grace_ms() -> u64 {
    5000
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

const fn default_metadata_timeout_secs() -> u64 {
    10
}

const fn default_media_timeout_secs() -> u64 {
    3600
}

const fn default_max_retries() -> u32 {
    3
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(dir) = &args.download_dir {
            self.downloads.dir = Some(dir.clone());
        }
        if let Some(quality) = &args.quality {
            self.downloads.quality.clone_from(quality);
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.images.cache_dir = Some(cache_dir.clone());
        }
        if let Some(api_base_url) = &args.api_base_url {
            self.network.api_base_url.clone_from(api_base_url);
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("dramadeck.log"))
    }

    /// Returns the default download directory.
    #[must_use]
    pub fn default_download_dir() -> PathBuf {
        UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(|d| d.join(APP_NAME)))
            .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME).join("downloads"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}
