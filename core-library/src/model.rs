//! Track identity and name normalization.
//!
//! Artist and title strings arrive from file names, the metadata cache, and
//! user-typed fetch requests. All of them are normalized to one canonical
//! casing before entering the index so the same track spelled differently
//! never duplicates: artists are word-title-cased, titles keep only a
//! leading capital.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Sentinel used for files whose track identity cannot be derived.
pub const UNKNOWN: &str = "_UNKNOWN_";

/// Title-case every whitespace-separated word: `daft punk` -> `Daft Punk`.
pub fn normalize_artist(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Capitalize only the first character: `ONE MORE TIME` -> `One more time`.
pub fn normalize_title(raw: &str) -> String {
    capitalize(raw.trim().to_lowercase().as_str())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Normalized (artist, title) pair identifying a track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackKey {
    pub artist: String,
    pub title: String,
}

impl TrackKey {
    /// Build a key, normalizing both parts.
    pub fn new(artist: &str, title: &str) -> Self {
        Self {
            artist: normalize_artist(artist),
            title: normalize_title(title),
        }
    }

    /// Build a key from already-normalized parts.
    pub fn raw(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }

    /// Whether this key carries the unknown-identity sentinel.
    pub fn is_unknown(&self) -> bool {
        self.artist == UNKNOWN
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// One track in a device's library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub key: TrackKey,
    /// Location of the track file on its device.
    pub file_ref: PathBuf,
}

impl LibraryEntry {
    pub fn new(key: TrackKey, file_ref: PathBuf) -> Self {
        Self { key, file_ref }
    }

    pub fn artist(&self) -> &str {
        &self.key.artist
    }

    pub fn title(&self) -> &str {
        &self.key.title
    }
}
