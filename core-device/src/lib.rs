//! # Device Module
//!
//! Discovers and tracks the storage targets holding music libraries:
//! the built-in local library directory plus any removable volume that
//! appears under the configured mount root.
//!
//! ## Components
//!
//! - **Device / DeviceId** (`device`): Identity and mount handle of one
//!   storage target, with a cancellation token tripped on detach
//! - **MountProbe** (`probe`): Capability trait for enumerating mounts,
//!   with a filesystem-backed default implementation
//! - **DeviceRegistry** (`registry`): Discovery-ordered device table with a
//!   polling watcher that emits coalesced device-list-changed events

pub mod device;
pub mod error;
pub mod probe;
pub mod registry;

pub use device::{Device, DeviceId};
pub use error::{DeviceError, Result};
pub use probe::{FsMountProbe, Mount, MountProbe};
pub use registry::{DeviceRegistry, DeviceWatcher};
