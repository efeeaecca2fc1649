use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "dramadeck",
    version,
    about = "Browse, preview and download short dramas from the terminal",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Directory downloads are written to.
    #[arg(long, value_name = "PATH", global = true)]
    pub download_dir: Option<PathBuf>,

    /// Requested stream quality (e.g. 1080p, 720p).
    #[arg(long, global = true)]
    pub quality: Option<String>,

    /// Image cache directory.
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Catalog API endpoint.
    #[arg(long, value_name = "URL", global = true)]
    pub api_base_url: Option<String>,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Search dramas by keyword.
    Search {
        /// Search keyword.
        keyword: String,
        /// Page number, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// List dramas of a category.
    Category {
        /// Category name.
        name: String,
        /// Page number, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// List the episodes of a drama.
    Episodes {
        /// Drama id.
        drama_id: String,
    },
    /// Fetch images through the cache tiers.
    Image {
        /// Image URLs.
        #[arg(required = true)]
        urls: Vec<String>,
        /// Clear both cache tiers first.
        #[arg(long)]
        clear_cache: bool,
    },
    /// Download episodes of a drama.
    Download {
        /// Drama id.
        drama_id: String,
        /// Only these episode (video) ids; all episodes when omitted.
        #[arg(long = "episode", value_name = "VIDEO_ID")]
        episodes: Vec<String>,
    },
}
