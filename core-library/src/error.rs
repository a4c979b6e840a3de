use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Device {device} has no index")]
    DeviceNotIndexed { device: String },

    #[error("Artist {artist} not found on {device}")]
    ArtistNotFound { device: String, artist: String },

    #[error("Scan of {root} failed: {reason}")]
    ScanFailed { root: String, reason: String },

    #[error("Metadata cache error: {0}")]
    Cache(String),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
