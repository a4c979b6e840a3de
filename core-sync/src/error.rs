//! Error types for sync sessions.

use thiserror::Error;

/// Errors from planning and running sync sessions.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A state transition the session machine does not allow.
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// The target device is gone or went offline mid-run.
    #[error("Device unavailable: {device}")]
    DeviceUnavailable { device: String },

    /// A copy operation failed at the filesystem level.
    #[error("Copy to {path} failed: {reason}")]
    Copy { path: String, reason: String },

    /// Library lookup failures while planning.
    #[error(transparent)]
    Library(#[from] core_library::LibraryError),

    /// Device registry lookup failures.
    #[error(transparent)]
    Device(#[from] core_device::DeviceError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
