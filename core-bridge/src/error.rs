//! Error type exposed to hosts.

use thiserror::Error;

/// Unified error the facade hands to host applications.
///
/// Each variant preserves the originating module's error so hosts can map
/// them onto their own status taxonomy without string matching.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Device(#[from] core_device::DeviceError),

    #[error(transparent)]
    Library(#[from] core_library::LibraryError),

    #[error(transparent)]
    Sync(#[from] core_sync::SyncError),

    #[error(transparent)]
    Fetch(#[from] core_fetch::FetchError),

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
