//! On-disk configuration file and the directories the app writes into.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::app_config::AppConfig;

const CONFIG_FILE_NAME: &str = "config.toml";
const INVALID_SUFFIX: &str = "invalid";

/// Configuration storage failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform reports no home directory.
    #[error("no home directory to place the configuration in")]
    NoHomeDir,
    /// A filesystem operation on `path` failed.
    #[error("cannot access {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// Serializing the configuration failed.
    #[error("cannot encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),
}

impl ConfigError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads and writes `config.toml`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store at the platform config location, e.g.
    /// `~/.config/dramadeck/config.toml`.
    ///
    /// # Errors
    /// Returns error if the platform has no home directory.
    pub fn locate() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from("com", "dramadeck", "dramadeck").ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::at(dirs.config_dir().join(CONFIG_FILE_NAME)))
    }

    /// Store backed by an explicit file.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The configuration file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a malformed file is copied before defaults take over.
    #[must_use]
    pub fn invalid_backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".");
        name.push(INVALID_SUFFIX);
        PathBuf::from(name)
    }

    /// Loads the configuration.
    ///
    /// A missing file is written with defaults. A malformed one is copied
    /// next to itself with an `.invalid` suffix, left in place, and defaults
    /// are returned.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, created or backed up.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Config file not found, writing defaults");
                let config = AppConfig::default();
                self.save(&config)?;
                return Ok(config);
            }
            Err(e) => return Err(ConfigError::io(&self.path)(e)),
        };

        match toml::from_str::<AppConfig>(&content) {
            Ok(config) => {
                debug!(path = %self.path.display(), "Config loaded");
                Ok(config)
            }
            Err(e) => {
                let backup = self.invalid_backup_path();
                fs::copy(&self.path, &backup).map_err(ConfigError::io(&backup))?;
                warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "Malformed config file, using defaults"
                );
                Ok(AppConfig::default())
            }
        }
    }

    /// Writes `config` atomically, creating the parent directory.
    ///
    /// # Errors
    /// Returns error if encoding or any filesystem step fails.
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(config)?;
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(ConfigError::io(parent))?;

        let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(ConfigError::io(parent))?;
        staged
            .write_all(content.as_bytes())
            .map_err(ConfigError::io(staged.path()))?;
        staged
            .persist(&self.path)
            .map_err(|e| ConfigError::io(&self.path)(e.error))?;
        Ok(())
    }
}

/// Creates the download and image cache directories of `config`.
///
/// Returns the directories that did not exist before.
///
/// # Errors
/// Returns error if a directory cannot be created.
pub fn prepare_directories(config: &AppConfig) -> Result<Vec<PathBuf>, ConfigError> {
    let wanted = [
        config.downloads.effective_dir(),
        config.images.loader_config().cache_dir,
    ];
    let mut created = Vec::new();
    for dir in wanted {
        if dir.is_dir() {
            continue;
        }
        fs::create_dir_all(&dir).map_err(ConfigError::io(&dir))?;
        info!(path = %dir.display(), "Created directory");
        created.push(dir);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_written_with_defaults() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("nested").join(CONFIG_FILE_NAME));

        let config = store.load().unwrap();
        assert_eq!(config.downloads.quality, "1080p");
        assert!(store.path().exists());

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.cache, config.cache);
        assert_eq!(reloaded.downloads, config.downloads);
    }

    #[test]
    fn test_malformed_file_is_backed_up() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join(CONFIG_FILE_NAME));
        fs::write(store.path(), "invalid_toml = [").unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.cache.max_entries, 500);

        assert_eq!(fs::read_to_string(store.path()).unwrap(), "invalid_toml = [");
        let backup = dir.path().join("config.toml.invalid");
        assert_eq!(store.invalid_backup_path(), backup);
        assert_eq!(fs::read_to_string(&backup).unwrap(), "invalid_toml = [");
    }

    #[test]
    fn test_valid_file_leaves_no_backup() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join(CONFIG_FILE_NAME));
        fs::write(store.path(), "[downloads]\nquality = \"480p\"\n").unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.downloads.quality, "480p");
        assert!(!store.invalid_backup_path().exists());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join(CONFIG_FILE_NAME));

        let mut config = AppConfig::default();
        config.downloads.quality = "720p".to_string();
        config.images.cache_dir = Some(dir.path().join("covers"));
        store.save(&config).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.downloads.quality, "720p");
        assert_eq!(loaded.images.cache_dir, Some(dir.path().join("covers")));
    }

    #[test]
    fn test_prepare_directories_creates_missing_only() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.downloads.dir = Some(dir.path().join("videos"));
        config.images.cache_dir = Some(dir.path().join("covers"));
        fs::create_dir_all(dir.path().join("covers")).unwrap();

        let created = prepare_directories(&config).unwrap();
        assert_eq!(created, vec![dir.path().join("videos")]);
        assert!(dir.path().join("videos").is_dir());

        assert!(prepare_directories(&config).unwrap().is_empty());
    }

    #[test]
    fn test_prepare_directories_reports_blocked_path() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let mut config = AppConfig::default();
        config.downloads.dir = Some(blocker.join("videos"));
        config.images.cache_dir = Some(dir.path().join("covers"));

        let err = prepare_directories(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path == &blocker.join("videos")));
    }
}
