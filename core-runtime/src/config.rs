//! # Core Configuration Module
//!
//! Provides configuration management for the Trackbay core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `CoreConfig` instance holding all settings the core modules need. It
//! enforces fail-fast validation so a misconfigured core refuses to start
//! with an actionable message instead of failing later mid-operation.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .library_root("/var/lib/trackbay/library")
//!     .mount_root("/Volumes")
//!     .max_concurrent_fetches(4)
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name under which the built-in library directory is registered as a device.
pub const LOCAL_DEVICE_NAME: &str = "local";

/// Default metadata cache file name, kept inside the library root.
pub const DEFAULT_CACHE_FILENAME: &str = ".trackcache.json";

/// Core configuration for the Trackbay core.
///
/// Use [`CoreConfig::builder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Directory holding the always-online local library.
    pub library_root: PathBuf,

    /// Directory under which removable devices appear as subdirectories
    /// (e.g. `/Volumes` on macOS, `/media/<user>` on Linux).
    pub mount_root: PathBuf,

    /// Path of the JSON track metadata cache.
    pub cache_path: PathBuf,

    /// Mount names that are never treated as devices (system volumes).
    pub ignored_mounts: HashSet<String>,

    /// How often the mount root is polled for attach/detach changes.
    pub poll_interval: Duration,

    /// Maximum number of fetch jobs downloading at once.
    pub max_concurrent_fetches: usize,

    /// Download attempts per fetch job before it fails.
    pub fetch_retry_attempts: u32,

    /// Maximum number of sync copy operations running at once.
    pub max_concurrent_copies: usize,

    /// Audio file extension the library recognizes.
    pub audio_extension: String,

    /// Event bus buffer size.
    pub event_buffer: usize,
}

impl CoreConfig {
    /// Start building a configuration.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// File name a track lands under inside a device root.
    pub fn track_file_name(&self, artist: &str, title: &str) -> String {
        format!("{} - {}.{}", artist, title, self.audio_extension)
    }
}

/// Builder for [`CoreConfig`] with fail-fast validation.
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    library_root: Option<PathBuf>,
    mount_root: Option<PathBuf>,
    cache_path: Option<PathBuf>,
    ignored_mounts: HashSet<String>,
    poll_interval: Option<Duration>,
    max_concurrent_fetches: Option<usize>,
    fetch_retry_attempts: Option<u32>,
    max_concurrent_copies: Option<usize>,
    audio_extension: Option<String>,
    event_buffer: Option<usize>,
}

impl CoreConfigBuilder {
    /// Set the local library directory (required).
    pub fn library_root(mut self, path: impl AsRef<Path>) -> Self {
        self.library_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the directory polled for removable devices (required).
    pub fn mount_root(mut self, path: impl AsRef<Path>) -> Self {
        self.mount_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the metadata cache file path.
    ///
    /// Defaults to `<library_root>/.trackcache.json`.
    pub fn cache_path(mut self, path: impl AsRef<Path>) -> Self {
        self.cache_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Add a mount name to ignore during device discovery.
    pub fn ignore_mount(mut self, name: impl Into<String>) -> Self {
        self.ignored_mounts.insert(name.into());
        self
    }

    /// Set the mount polling interval (default: 1s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the fetch worker pool size (default: 4).
    pub fn max_concurrent_fetches(mut self, n: usize) -> Self {
        self.max_concurrent_fetches = Some(n);
        self
    }

    /// Set download attempts per fetch job (default: 3).
    pub fn fetch_retry_attempts(mut self, n: u32) -> Self {
        self.fetch_retry_attempts = Some(n);
        self
    }

    /// Set the sync copy concurrency (default: 2).
    pub fn max_concurrent_copies(mut self, n: usize) -> Self {
        self.max_concurrent_copies = Some(n);
        self
    }

    /// Set the recognized audio extension (default: "mp3").
    pub fn audio_extension(mut self, ext: impl Into<String>) -> Self {
        self.audio_extension = Some(ext.into());
        self
    }

    /// Set the event bus buffer size (default: 100).
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = Some(capacity);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` with an actionable message if a required
    /// setting is missing or a value is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let library_root = self.library_root.ok_or_else(|| {
            Error::Config(
                "library_root is required - call .library_root(path) with the local library \
                 directory"
                    .to_string(),
            )
        })?;

        let mount_root = self.mount_root.ok_or_else(|| {
            Error::Config(
                "mount_root is required - call .mount_root(path) with the volumes directory"
                    .to_string(),
            )
        })?;

        let cache_path = self
            .cache_path
            .unwrap_or_else(|| library_root.join(DEFAULT_CACHE_FILENAME));

        let poll_interval = self.poll_interval.unwrap_or(Duration::from_secs(1));
        if poll_interval.is_zero() {
            return Err(Error::Config(
                "poll_interval must be greater than zero".to_string(),
            ));
        }

        let max_concurrent_fetches = self.max_concurrent_fetches.unwrap_or(4);
        if max_concurrent_fetches == 0 {
            return Err(Error::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }

        let max_concurrent_copies = self.max_concurrent_copies.unwrap_or(2);
        if max_concurrent_copies == 0 {
            return Err(Error::Config(
                "max_concurrent_copies must be at least 1".to_string(),
            ));
        }

        let audio_extension = self.audio_extension.unwrap_or_else(|| "mp3".to_string());
        if audio_extension.is_empty() || audio_extension.contains('.') {
            return Err(Error::Config(format!(
                "audio_extension must be a bare extension, got {:?}",
                audio_extension
            )));
        }

        let event_buffer = self.event_buffer.unwrap_or(100);
        if event_buffer == 0 {
            return Err(Error::Config(
                "event_buffer must be at least 1".to_string(),
            ));
        }

        Ok(CoreConfig {
            library_root,
            mount_root,
            cache_path,
            ignored_mounts: self.ignored_mounts,
            poll_interval,
            max_concurrent_fetches,
            fetch_retry_attempts: self.fetch_retry_attempts.unwrap_or(3),
            max_concurrent_copies,
            audio_extension,
            event_buffer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> CoreConfigBuilder {
        CoreConfig::builder()
            .library_root("/tmp/library")
            .mount_root("/tmp/volumes")
    }

    #[test]
    fn test_minimal_config_with_defaults() {
        let config = minimal().build().unwrap();

        assert_eq!(config.library_root, PathBuf::from("/tmp/library"));
        assert_eq!(
            config.cache_path,
            PathBuf::from("/tmp/library").join(DEFAULT_CACHE_FILENAME)
        );
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.max_concurrent_fetches, 4);
        assert_eq!(config.fetch_retry_attempts, 3);
        assert_eq!(config.audio_extension, "mp3");
    }

    #[test]
    fn test_missing_library_root() {
        let result = CoreConfig::builder().mount_root("/tmp/volumes").build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("library_root"));
    }

    #[test]
    fn test_missing_mount_root() {
        let result = CoreConfig::builder().library_root("/tmp/library").build();
        assert!(result.unwrap_err().to_string().contains("mount_root"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = minimal().max_concurrent_fetches(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_extension_rejected() {
        assert!(minimal().audio_extension(".mp3").build().is_err());
        assert!(minimal().audio_extension("").build().is_err());
    }

    #[test]
    fn test_ignored_mounts() {
        let config = minimal()
            .ignore_mount("Macintosh HD")
            .ignore_mount("Recovery")
            .build()
            .unwrap();

        assert!(config.ignored_mounts.contains("Macintosh HD"));
        assert!(config.ignored_mounts.contains("Recovery"));
        assert_eq!(config.ignored_mounts.len(), 2);
    }

    #[test]
    fn test_track_file_name() {
        let config = minimal().build().unwrap();
        assert_eq!(
            config.track_file_name("Daft Punk", "One more time"),
            "Daft Punk - One more time.mp3"
        );
    }
}
