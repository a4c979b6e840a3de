//! JSON metadata cache.
//!
//! Maps a track's file name to its (artist, title) pair so rescans of large
//! devices skip name derivation for files seen before. The cache is a single
//! JSON object persisted next to the local library; a missing file is
//! equivalent to an empty cache. Existing entries are never overwritten, a
//! file name's first recorded identity wins.

use crate::error::{LibraryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cached identity of one track file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTrack {
    pub artist: String,
    pub title: String,
}

/// File-backed cache of file name -> track identity.
#[derive(Debug)]
pub struct TrackCache {
    path: PathBuf,
    entries: HashMap<String, CachedTrack>,
}

impl TrackCache {
    /// Load the cache from `path`, treating a missing file as empty.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| LibraryError::Cache(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no metadata cache yet, starting empty");
                HashMap::new()
            }
            Err(e) => {
                return Err(LibraryError::Cache(format!("{}: {}", path.display(), e)));
            }
        };

        Ok(Self { path, entries })
    }

    /// Look up a file name.
    pub fn get(&self, file_name: &str) -> Option<&CachedTrack> {
        self.entries.get(file_name)
    }

    /// Record an identity for a file name unless one is already present.
    ///
    /// Returns whether the cache changed.
    pub fn record(&mut self, file_name: &str, artist: &str, title: &str) -> bool {
        if self.entries.contains_key(file_name) {
            return false;
        }
        self.entries.insert(
            file_name.to_string(),
            CachedTrack {
                artist: artist.to_string(),
                title: title.to_string(),
            },
        );
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the cache back to disk.
    pub async fn persist(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| LibraryError::Cache(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| LibraryError::Cache(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TrackCache::load(dir.path().join("cache.json")).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_record_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = TrackCache::load(&path).await.unwrap();
        assert!(cache.record("Daft Punk - One more time.mp3", "Daft Punk", "One more time"));
        cache.persist().await.unwrap();

        let reloaded = TrackCache::load(&path).await.unwrap();
        let cached = reloaded.get("Daft Punk - One more time.mp3").unwrap();
        assert_eq!(cached.artist, "Daft Punk");
        assert_eq!(cached.title, "One more time");
    }

    #[tokio::test]
    async fn test_first_record_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TrackCache::load(dir.path().join("cache.json")).await.unwrap();

        assert!(cache.record("x.mp3", "Daft Punk", "Aerodynamic"));
        assert!(!cache.record("x.mp3", "Someone Else", "Other"));

        assert_eq!(cache.get("x.mp3").unwrap().artist, "Daft Punk");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        assert!(TrackCache::load(&path).await.is_err());
    }
}
