//! # Fetch Pipeline Module
//!
//! Acquires tracks from an external source onto a device.
//!
//! ## Overview
//!
//! - **Job** (`job`): `FetchJob` lifecycle state machine with failure causes
//! - **Source** (`source`): `TrackSource` capability trait (resolve +
//!   streaming download)
//! - **Pipeline** (`pipeline`): batch validation, bounded worker pool,
//!   partial-file writes, progress coalescing, detach cancellation
//!
//! Downloads land as `<name>.part` and are renamed into place only once the
//! bytes are complete, so a device never carries a torn track file.

pub mod error;
pub mod job;
pub mod pipeline;
pub mod source;

pub use error::{FetchError, Result};
pub use job::{FailureCause, FetchJob, FetchRequest, FetchState};
pub use pipeline::{BatchAcceptance, FetchPipeline, RejectedRequest};
pub use source::{ByteStream, SourceCandidate, TrackSource};
