//! Error types for the fetch pipeline.

use thiserror::Error;

/// Errors surfaced by the fetch pipeline API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A request failed validation and never became a job.
    #[error("Invalid fetch request: {reason}")]
    Validation { reason: String },

    /// A job state transition the machine does not allow.
    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// The target device is gone or went offline.
    #[error("Device unavailable: {device}")]
    DeviceUnavailable { device: String },

    /// The source could not resolve the requested track.
    #[error("No source found for {artist} - {title}")]
    Resolution { artist: String, title: String },

    /// The download failed after exhausting retries.
    #[error("Transfer failed: {reason}")]
    Transfer { reason: String },

    /// The downloaded bytes could not be written into place.
    #[error("Write failed for {path}: {reason}")]
    Write { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, FetchError>;
