//! # Library Index
//!
//! Per-device catalog of artists -> ordered track lists.
//!
//! ## Overview
//!
//! Each device maps to an immutable [`DeviceIndex`] snapshot held behind an
//! `Arc`. Readers clone the `Arc` and are never blocked by writers; writers
//! build a replacement snapshot and swap it in whole, so no reader ever
//! observes a half-rebuilt index. All writes for one device funnel through
//! that device's writer mutex, which serializes sync copies, fetch landings
//! and rebuilds against each other.
//!
//! Ordering is lexicographic (`BTreeMap`), hence stable and deterministic
//! for identical underlying data.

use crate::error::{LibraryError, Result};
use crate::model::{LibraryEntry, TrackKey};
use crate::scanner::TrackScanner;
use core_device::DeviceId;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Immutable artist -> titles view for one device.
#[derive(Debug, Default, Clone)]
pub struct DeviceIndex {
    artists: BTreeMap<String, BTreeMap<String, LibraryEntry>>,
}

impl DeviceIndex {
    fn insert(&mut self, entry: LibraryEntry) {
        self.artists
            .entry(entry.key.artist.clone())
            .or_default()
            .insert(entry.key.title.clone(), entry);
    }

    fn remove(&mut self, key: &TrackKey) -> bool {
        let Some(titles) = self.artists.get_mut(&key.artist) else {
            return false;
        };
        let removed = titles.remove(&key.title).is_some();
        if titles.is_empty() {
            self.artists.remove(&key.artist);
        }
        removed
    }

    fn artist_names(&self) -> Vec<String> {
        self.artists.keys().cloned().collect()
    }

    fn titles(&self, artist: &str) -> Option<Vec<String>> {
        self.artists
            .get(artist)
            .map(|titles| titles.keys().cloned().collect())
    }

    fn entries(&self) -> Vec<LibraryEntry> {
        self.artists
            .values()
            .flat_map(|titles| titles.values().cloned())
            .collect()
    }

    fn len(&self) -> usize {
        self.artists.values().map(|titles| titles.len()).sum()
    }
}

/// A file skipped during a rebuild.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a rebuild.
///
/// A rebuild that hit unreadable storage still indexes everything it could
/// read; `skipped` carries the casualties and [`RebuildReport::is_partial`]
/// flags the degraded condition.
#[derive(Debug)]
pub struct RebuildReport {
    pub indexed: u64,
    pub skipped: Vec<SkippedFile>,
}

impl RebuildReport {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Per-device library catalog with atomic snapshot swaps.
pub struct LibraryIndex {
    snapshots: RwLock<HashMap<DeviceId, Arc<DeviceIndex>>>,
    writers: Mutex<HashMap<DeviceId, Arc<Mutex<()>>>>,
}

impl LibraryIndex {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// The writer mutex for one device. Sync and fetch writes share it with
    /// rebuilds, one writer at a time per device.
    async fn writer(&self, device: &DeviceId) -> Arc<Mutex<()>> {
        let mut writers = self.writers.lock().await;
        writers
            .entry(device.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn snapshot(&self, device: &DeviceId) -> Result<Arc<DeviceIndex>> {
        self.snapshots
            .read()
            .await
            .get(device)
            .cloned()
            .ok_or_else(|| LibraryError::DeviceNotIndexed {
                device: device.to_string(),
            })
    }

    /// Whether the device has been indexed at least once.
    pub async fn has_index(&self, device: &DeviceId) -> bool {
        self.snapshots.read().await.contains_key(device)
    }

    /// Rescan a device and replace its index atomically.
    ///
    /// The fresh index is built off to the side and swapped in whole;
    /// concurrent readers keep the previous snapshot until the swap.
    ///
    /// # Errors
    ///
    /// Fails if the device root itself is unreadable; the previous index
    /// (if any) is left untouched in that case.
    pub async fn rebuild(
        &self,
        device: &DeviceId,
        root: &Path,
        scanner: &dyn TrackScanner,
    ) -> Result<RebuildReport> {
        let writer = self.writer(device).await;
        let _guard = writer.lock().await;

        let outcome = scanner.scan(root).await?;

        let mut fresh = DeviceIndex::default();
        for track in outcome.tracks {
            fresh.insert(LibraryEntry::new(track.key, track.path));
        }

        let report = RebuildReport {
            indexed: fresh.len() as u64,
            skipped: outcome
                .skipped
                .into_iter()
                .map(|(path, reason)| SkippedFile { path, reason })
                .collect(),
        };

        if report.is_partial() {
            warn!(
                device = %device,
                skipped = report.skipped.len(),
                "rebuild degraded, keeping readable entries"
            );
        }
        info!(device = %device, tracks = report.indexed, "index rebuilt");

        self.snapshots
            .write()
            .await
            .insert(device.clone(), Arc::new(fresh));

        Ok(report)
    }

    /// Ordered artist names for a device. Stable across calls for unchanged
    /// underlying data.
    pub async fn list_artists(&self, device: &DeviceId) -> Result<Vec<String>> {
        Ok(self.snapshot(device).await?.artist_names())
    }

    /// Ordered track titles for one artist on a device.
    pub async fn list_tracks(&self, device: &DeviceId, artist: &str) -> Result<Vec<String>> {
        self.snapshot(device)
            .await?
            .titles(artist)
            .ok_or_else(|| LibraryError::ArtistNotFound {
                device: device.to_string(),
                artist: artist.to_string(),
            })
    }

    /// All entries of a device, for sync planning.
    pub async fn entries(&self, device: &DeviceId) -> Result<Vec<LibraryEntry>> {
        Ok(self.snapshot(device).await?.entries())
    }

    /// Point lookup of one entry.
    pub async fn entry(&self, device: &DeviceId, key: &TrackKey) -> Result<Option<LibraryEntry>> {
        let snapshot = self.snapshot(device).await?;
        Ok(snapshot
            .artists
            .get(&key.artist)
            .and_then(|titles| titles.get(&key.title))
            .cloned())
    }

    /// Idempotent upsert of one entry.
    ///
    /// A duplicate (device, artist, title) key overwrites the file
    /// reference rather than duplicating the track.
    pub async fn record_entry(&self, device: &DeviceId, key: TrackKey, file_ref: PathBuf) {
        let writer = self.writer(device).await;
        let _guard = writer.lock().await;

        let mut snapshots = self.snapshots.write().await;
        let current = snapshots.get(device).cloned().unwrap_or_default();
        let mut next = (*current).clone();
        next.insert(LibraryEntry::new(key, file_ref));
        snapshots.insert(device.clone(), Arc::new(next));
    }

    /// Remove one entry; no-op if absent.
    pub async fn remove_entry(&self, device: &DeviceId, key: &TrackKey) {
        let writer = self.writer(device).await;
        let _guard = writer.lock().await;

        let mut snapshots = self.snapshots.write().await;
        let Some(current) = snapshots.get(device).cloned() else {
            return;
        };
        let mut next = (*current).clone();
        if next.remove(key) {
            snapshots.insert(device.clone(), Arc::new(next));
        }
    }

    /// Drop a detached device's index and writer state.
    pub async fn drop_device(&self, device: &DeviceId) {
        self.snapshots.write().await.remove(device);
        self.writers.lock().await.remove(device);
    }
}

impl Default for LibraryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{ScanOutcome, ScannedTrack};
    use async_trait::async_trait;

    struct FixedScanner {
        tracks: Vec<(&'static str, &'static str)>,
        skipped: usize,
    }

    #[async_trait]
    impl TrackScanner for FixedScanner {
        async fn scan(&self, root: &Path) -> Result<ScanOutcome> {
            Ok(ScanOutcome {
                tracks: self
                    .tracks
                    .iter()
                    .map(|(artist, title)| ScannedTrack {
                        key: TrackKey::new(artist, title),
                        path: root.join(format!("{} - {}.mp3", artist, title)),
                    })
                    .collect(),
                skipped: (0..self.skipped)
                    .map(|i| (root.join(format!("bad{}.mp3", i)), "io error".to_string()))
                    .collect(),
            })
        }
    }

    fn dev(name: &str) -> DeviceId {
        DeviceId::new(name)
    }

    #[tokio::test]
    async fn test_list_artists_sorted_and_stable() {
        let index = LibraryIndex::new();
        let scanner = FixedScanner {
            tracks: vec![
                ("Zhu", "Faded"),
                ("Daft Punk", "One more time"),
                ("Daft Punk", "Aerodynamic"),
            ],
            skipped: 0,
        };

        index
            .rebuild(&dev("local"), Path::new("/lib"), &scanner)
            .await
            .unwrap();

        let first = index.list_artists(&dev("local")).await.unwrap();
        let second = index.list_artists(&dev("local")).await.unwrap();
        assert_eq!(first, vec!["Daft Punk", "Zhu"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_list_tracks_sorted() {
        let index = LibraryIndex::new();
        let scanner = FixedScanner {
            tracks: vec![
                ("Daft Punk", "One more time"),
                ("Daft Punk", "Aerodynamic"),
            ],
            skipped: 0,
        };
        index
            .rebuild(&dev("local"), Path::new("/lib"), &scanner)
            .await
            .unwrap();

        let tracks = index.list_tracks(&dev("local"), "Daft Punk").await.unwrap();
        assert_eq!(tracks, vec!["Aerodynamic", "One more time"]);
    }

    #[tokio::test]
    async fn test_unknown_artist_fails() {
        let index = LibraryIndex::new();
        index
            .rebuild(
                &dev("local"),
                Path::new("/lib"),
                &FixedScanner {
                    tracks: vec![],
                    skipped: 0,
                },
            )
            .await
            .unwrap();

        let result = index.list_tracks(&dev("local"), "Nobody").await;
        assert!(matches!(result, Err(LibraryError::ArtistNotFound { .. })));
    }

    #[tokio::test]
    async fn test_unindexed_device_fails() {
        let index = LibraryIndex::new();
        let result = index.list_artists(&dev("GHOST")).await;
        assert!(matches!(result, Err(LibraryError::DeviceNotIndexed { .. })));
    }

    #[tokio::test]
    async fn test_record_entry_idempotent() {
        let index = LibraryIndex::new();
        let key = TrackKey::new("Daft Punk", "One more time");

        // Recording twice with the same key keeps exactly one row, with the
        // later file reference winning.
        index
            .record_entry(&dev("local"), key.clone(), PathBuf::from("/a.mp3"))
            .await;
        index
            .record_entry(&dev("local"), key.clone(), PathBuf::from("/b.mp3"))
            .await;

        let tracks = index.list_tracks(&dev("local"), "Daft Punk").await.unwrap();
        assert_eq!(tracks, vec!["One more time"]);

        let entry = index.entry(&dev("local"), &key).await.unwrap().unwrap();
        assert_eq!(entry.file_ref, PathBuf::from("/b.mp3"));
    }

    #[tokio::test]
    async fn test_remove_entry_drops_empty_artist() {
        let index = LibraryIndex::new();
        let key = TrackKey::new("Daft Punk", "One more time");
        index
            .record_entry(&dev("local"), key.clone(), PathBuf::from("/a.mp3"))
            .await;

        index.remove_entry(&dev("local"), &key).await;

        assert!(index.list_artists(&dev("local")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_scan_keeps_readable_entries() {
        let index = LibraryIndex::new();
        let scanner = FixedScanner {
            tracks: vec![("Daft Punk", "Aerodynamic")],
            skipped: 2,
        };

        let report = index
            .rebuild(&dev("USB_STICK"), Path::new("/usb"), &scanner)
            .await
            .unwrap();

        assert!(report.is_partial());
        assert_eq!(report.indexed, 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(
            index.list_artists(&dev("USB_STICK")).await.unwrap(),
            vec!["Daft Punk"]
        );
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_index() {
        struct FailingScanner;

        #[async_trait]
        impl TrackScanner for FailingScanner {
            async fn scan(&self, root: &Path) -> Result<ScanOutcome> {
                Err(LibraryError::ScanFailed {
                    root: root.display().to_string(),
                    reason: "gone".to_string(),
                })
            }
        }

        let index = LibraryIndex::new();
        index
            .rebuild(
                &dev("local"),
                Path::new("/lib"),
                &FixedScanner {
                    tracks: vec![("Daft Punk", "Aerodynamic")],
                    skipped: 0,
                },
            )
            .await
            .unwrap();

        assert!(index
            .rebuild(&dev("local"), Path::new("/lib"), &FailingScanner)
            .await
            .is_err());

        // Previous snapshot still serves reads
        assert_eq!(
            index.list_artists(&dev("local")).await.unwrap(),
            vec!["Daft Punk"]
        );
    }

    #[tokio::test]
    async fn test_rebuild_swap_is_atomic_under_concurrent_reads() {
        let index = Arc::new(LibraryIndex::new());
        index
            .rebuild(
                &dev("local"),
                Path::new("/lib"),
                &FixedScanner {
                    tracks: vec![("Daft Punk", "Aerodynamic"), ("Zhu", "Faded")],
                    skipped: 0,
                },
            )
            .await
            .unwrap();

        let reader = {
            let index = Arc::clone(&index);
            tokio::spawn(async move {
                // Every observation is one of the two complete snapshots,
                // never an artist with no tracks.
                for _ in 0..200 {
                    let artists = index.list_artists(&dev("local")).await.unwrap();
                    assert!(
                        artists == vec!["Daft Punk", "Zhu"] || artists == vec!["Daft Punk"],
                        "unexpected snapshot: {:?}",
                        artists
                    );
                    for artist in &artists {
                        let tracks = index.list_tracks(&dev("local"), artist).await;
                        assert!(tracks.map(|t| !t.is_empty()).unwrap_or(false));
                    }
                }
            })
        };

        for _ in 0..20 {
            index
                .rebuild(
                    &dev("local"),
                    Path::new("/lib"),
                    &FixedScanner {
                        tracks: vec![("Daft Punk", "Aerodynamic")],
                        skipped: 0,
                    },
                )
                .await
                .unwrap();
            index
                .rebuild(
                    &dev("local"),
                    Path::new("/lib"),
                    &FixedScanner {
                        tracks: vec![("Daft Punk", "Aerodynamic"), ("Zhu", "Faded")],
                        skipped: 0,
                    },
                )
                .await
                .unwrap();
        }

        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_device() {
        let index = LibraryIndex::new();
        index
            .record_entry(
                &dev("USB_STICK"),
                TrackKey::new("Daft Punk", "Aerodynamic"),
                PathBuf::from("/usb/a.mp3"),
            )
            .await;

        index.drop_device(&dev("USB_STICK")).await;

        assert!(!index.has_index(&dev("USB_STICK")).await);
    }
}
