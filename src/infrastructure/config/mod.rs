//! Application configuration.

pub mod app_config;
pub mod args;
pub mod storage;

pub use app_config::{
    AppConfig, CacheConfig, DownloadsConfig, ImagesConfig, LogLevel, NetworkConfig,
};
pub use args::{CliArgs, Command};
pub use storage::{ConfigError, ConfigStore, prepare_directories};
