//! Track scanning capability.
//!
//! The index never reads storage directly; a [`TrackScanner`] enumerates a
//! device root and yields the tracks it can identify. The default
//! [`ConventionScanner`] recognizes files by extension and derives identity
//! from the metadata cache first, then from the `Artist - Title.ext` file
//! naming convention; files matching neither are filed under the
//! [`UNKNOWN`](crate::model::UNKNOWN) sentinel artist with their stem as
//! title.
//!
//! Per-file read errors do not abort a scan: they are collected so already
//! scanned entries stay usable and the caller can surface a partial-scan
//! condition.

use crate::cache::TrackCache;
use crate::error::{LibraryError, Result};
use crate::model::{normalize_artist, normalize_title, TrackKey, UNKNOWN};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One file the scanner could identify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedTrack {
    pub key: TrackKey,
    pub path: PathBuf,
}

/// Result of scanning one device root.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub tracks: Vec<ScannedTrack>,
    /// Files that could not be read, with the reason. Non-empty means the
    /// scan is partial, not failed.
    pub skipped: Vec<(PathBuf, String)>,
}

/// Capability for enumerating the tracks on a device.
#[async_trait]
pub trait TrackScanner: Send + Sync {
    /// Scan `root` for tracks.
    ///
    /// # Errors
    ///
    /// Fails only when `root` itself is unreadable; per-file problems are
    /// reported through [`ScanOutcome::skipped`].
    async fn scan(&self, root: &Path) -> Result<ScanOutcome>;
}

/// Scanner deriving track identity from file names and the metadata cache.
pub struct ConventionScanner {
    extension: String,
    cache: Arc<Mutex<TrackCache>>,
}

impl ConventionScanner {
    pub fn new(extension: impl Into<String>, cache: Arc<Mutex<TrackCache>>) -> Self {
        Self {
            extension: extension.into(),
            cache,
        }
    }

    /// Parse `Artist - Title` out of a file stem.
    fn parse_stem(stem: &str) -> Option<TrackKey> {
        let (artist, title) = stem.split_once(" - ")?;
        if artist.trim().is_empty() || title.trim().is_empty() {
            return None;
        }
        Some(TrackKey::raw(normalize_artist(artist), normalize_title(title)))
    }
}

#[async_trait]
impl TrackScanner for ConventionScanner {
    async fn scan(&self, root: &Path) -> Result<ScanOutcome> {
        let mut entries = tokio::fs::read_dir(root).await.map_err(|e| {
            LibraryError::ScanFailed {
                root: root.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut outcome = ScanOutcome::default();
        let suffix = format!(".{}", self.extension);
        let mut cache = self.cache.lock().await;
        let mut cache_dirty = false;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    // Directory iteration degraded mid-scan; keep what we have.
                    outcome.skipped.push((root.to_path_buf(), e.to_string()));
                    break;
                }
            };

            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(&suffix) || file_name.ends_with(".part") {
                continue;
            }

            match entry.file_type().await {
                Ok(t) if t.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    outcome.skipped.push((entry.path(), e.to_string()));
                    continue;
                }
            }

            let key = if let Some(cached) = cache.get(&file_name) {
                TrackKey::raw(cached.artist.clone(), cached.title.clone())
            } else {
                let stem = &file_name[..file_name.len() - suffix.len()];
                let key = Self::parse_stem(stem)
                    .unwrap_or_else(|| TrackKey::raw(UNKNOWN, stem.to_string()));
                if !key.is_unknown() {
                    cache_dirty |= cache.record(&file_name, &key.artist, &key.title);
                }
                key
            };

            outcome.tracks.push(ScannedTrack {
                key,
                path: entry.path(),
            });
        }

        if cache_dirty {
            if let Err(e) = cache.persist().await {
                warn!(error = %e, "failed to persist metadata cache");
            }
        }

        debug!(
            root = %root.display(),
            tracks = outcome.tracks.len(),
            skipped = outcome.skipped.len(),
            "scan finished"
        );
        Ok(outcome)
    }
}
