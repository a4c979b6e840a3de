use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device {id} not found")]
    NotFound { id: String },

    #[error("Device {id} is offline")]
    Offline { id: String },

    #[error("Mount probe failed: {0}")]
    Probe(String),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
