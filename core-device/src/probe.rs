//! Mount enumeration capability.
//!
//! Device discovery is abstracted behind [`MountProbe`] so the registry can
//! be driven by the filesystem in production and by a scripted probe in
//! tests. The default [`FsMountProbe`] lists the subdirectories of a mount
//! root (e.g. `/Volumes`) minus a set of ignored system volumes.

use crate::error::{DeviceError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;

/// One discovered mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Mount directory name, used as the device identity.
    pub name: String,
    /// Absolute path of the mount.
    pub root: PathBuf,
}

/// Capability for enumerating currently attached mounts.
#[async_trait]
pub trait MountProbe: Send + Sync {
    /// Returns the mounts present right now, in no particular order.
    async fn mounts(&self) -> Result<Vec<Mount>>;
}

/// Filesystem-backed probe listing subdirectories of a mount root.
pub struct FsMountProbe {
    root: PathBuf,
    ignored: HashSet<String>,
}

impl FsMountProbe {
    pub fn new(root: PathBuf, ignored: HashSet<String>) -> Self {
        Self { root, ignored }
    }
}

#[async_trait]
impl MountProbe for FsMountProbe {
    async fn mounts(&self) -> Result<Vec<Mount>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| DeviceError::Probe(format!("{}: {}", self.root.display(), e)))?;

        let mut mounts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DeviceError::Probe(e.to_string()))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| DeviceError::Probe(e.to_string()))?;
            if !file_type.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if self.ignored.contains(&name) || name.starts_with('.') {
                continue;
            }

            mounts.push(Mount {
                name,
                root: entry.path(),
            });
        }

        Ok(mounts)
    }
}
