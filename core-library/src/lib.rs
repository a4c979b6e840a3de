//! # Library Index Module
//!
//! Per-device catalog of artists and tracks.
//!
//! ## Overview
//!
//! The truth about a device's library lives on its storage; this crate
//! derives a fast, deterministic in-memory view over it:
//!
//! - **Model** (`model`): Track keys, name normalization, library entries
//! - **Cache** (`cache`): JSON sidecar mapping file names to track metadata
//!   so rescans avoid re-deriving names
//! - **Scanner** (`scanner`): `TrackScanner` capability trait with a
//!   filename-convention implementation
//! - **Index** (`index`): `LibraryIndex` with atomic snapshot swaps on
//!   rebuild and per-device writer serialization

pub mod cache;
pub mod error;
pub mod index;
pub mod model;
pub mod scanner;

pub use cache::{CachedTrack, TrackCache};
pub use error::{LibraryError, Result};
pub use index::{LibraryIndex, RebuildReport, SkippedFile};
pub use model::{LibraryEntry, TrackKey, UNKNOWN};
pub use scanner::{ConventionScanner, ScanOutcome, ScannedTrack, TrackScanner};
