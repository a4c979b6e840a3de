//! Device identity and mount handle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Stable identifier for a storage device.
///
/// The mount directory name doubles as the identity, matching how the UI
/// addresses devices; the built-in library is always `local`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A storage target holding its own music library.
///
/// Cloning a `Device` shares the cancellation token: work scoped to the
/// device can `select!` on [`Device::cancelled`] and is torn down when the
/// registry marks the device offline.
#[derive(Debug, Clone)]
pub struct Device {
    id: DeviceId,
    root: PathBuf,
    online: bool,
    guard: CancellationToken,
}

impl Device {
    pub(crate) fn new(id: DeviceId, root: PathBuf) -> Self {
        Self {
            id,
            root,
            online: true,
            guard: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.as_str()
    }

    /// Root directory of this device's library.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub(crate) fn mark_offline(&mut self) {
        self.online = false;
        self.guard.cancel();
    }

    /// Token cancelled when the device detaches.
    ///
    /// In-flight work targeting the device uses this to abort instead of
    /// writing to a vanished mount.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.guard.clone()
    }

    /// Resolves once the device has detached.
    pub async fn cancelled(&self) {
        self.guard.cancelled().await
    }
}
