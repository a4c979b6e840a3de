//! # Device Registry
//!
//! Tracks the storage devices available to the core, in discovery order,
//! and drives attach/detach detection through a [`MountProbe`].
//!
//! ## Overview
//!
//! The registry owns all `Device` records. The local library directory is
//! registered as a permanent first device; removable volumes come and go as
//! the polling watcher diffs the probe's mount set against the known one.
//! Consumers subscribe to the shared [`EventBus`]: every tick that changes
//! the device set produces per-device `Attached`/`Detached` events plus a
//! single coalesced `ListChanged` notification.
//!
//! Detaching a device cancels its cancellation token, which tears down any
//! in-flight sync or fetch work scoped to it.

use crate::device::{Device, DeviceId};
use crate::error::{DeviceError, Result};
use crate::probe::{Mount, MountProbe};
use core_runtime::config::LOCAL_DEVICE_NAME;
use core_runtime::events::{CoreEvent, DeviceEvent, EventBus, EventSeverity};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Discovery-ordered device table.
pub struct DeviceRegistry {
    event_bus: EventBus,
    devices: RwLock<Vec<Device>>,
}

impl DeviceRegistry {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            event_bus,
            devices: RwLock::new(Vec::new()),
        }
    }

    /// Register the built-in library directory as the always-online first
    /// device.
    pub async fn register_local(&self, root: PathBuf) -> Device {
        self.register(DeviceId::new(LOCAL_DEVICE_NAME), root)
            .await
    }

    /// Register a device, appending it to the discovery order.
    ///
    /// Re-registering an online device with the same id is a no-op and
    /// returns the existing record.
    pub async fn register(&self, id: DeviceId, root: PathBuf) -> Device {
        let device = self.register_quiet(id, root).await;
        self.emit_list_changed().await;
        device
    }

    /// Remove a device and cancel all work scoped to it.
    pub async fn detach(&self, id: &DeviceId) -> Result<()> {
        self.detach_quiet(id).await?;
        self.emit_list_changed().await;
        Ok(())
    }

    /// Register without announcing the new list; `apply_mounts` batches
    /// several of these under one `ListChanged`.
    async fn register_quiet(&self, id: DeviceId, root: PathBuf) -> Device {
        let mut devices = self.devices.write().await;
        if let Some(existing) = devices.iter().find(|d| d.id() == &id) {
            return existing.clone();
        }

        let device = Device::new(id.clone(), root);
        devices.push(device.clone());
        drop(devices);

        info!(device = %id, "device attached");
        self.event_bus
            .emit(CoreEvent::Device(DeviceEvent::Attached {
                name: id.to_string(),
            }))
            .ok();
        self.event_bus
            .emit(CoreEvent::notice(
                format!("External disk detected {}!", id),
                EventSeverity::Info,
            ))
            .ok();

        device
    }

    async fn detach_quiet(&self, id: &DeviceId) -> Result<()> {
        let mut devices = self.devices.write().await;
        let position = devices
            .iter()
            .position(|d| d.id() == id)
            .ok_or_else(|| DeviceError::NotFound { id: id.to_string() })?;

        let mut removed = devices.remove(position);
        removed.mark_offline();
        drop(devices);

        warn!(device = %id, "device detached");
        self.event_bus
            .emit(CoreEvent::Device(DeviceEvent::Detached {
                name: id.to_string(),
            }))
            .ok();
        self.event_bus
            .emit(CoreEvent::notice(
                format!("External disk removed {}", id),
                EventSeverity::Warning,
            ))
            .ok();

        Ok(())
    }

    async fn emit_list_changed(&self) {
        let names = self.device_names().await;
        self.event_bus
            .emit(CoreEvent::Device(DeviceEvent::ListChanged { names }))
            .ok();
    }

    /// Snapshot of current devices in discovery order. May be empty.
    pub async fn list_devices(&self) -> Vec<Device> {
        self.devices.read().await.clone()
    }

    /// Current device names in discovery order.
    pub async fn device_names(&self) -> Vec<String> {
        device_names(&self.devices.read().await)
    }

    /// Look up a device by id.
    pub async fn get(&self, id: &DeviceId) -> Result<Device> {
        self.devices
            .read()
            .await
            .iter()
            .find(|d| d.id() == id)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound { id: id.to_string() })
    }

    /// Apply one probe observation, diffing it against the known removable
    /// devices.
    ///
    /// Registers newly appeared mounts and detaches vanished ones. All
    /// changes within the observation share one poll tick: subscribers get
    /// the per-device detail events plus exactly one `ListChanged` when the
    /// set changed. Returns whether anything changed.
    pub async fn apply_mounts(&self, mounts: Vec<Mount>) -> bool {
        let found: HashSet<String> = mounts.iter().map(|m| m.name.clone()).collect();

        let known: Vec<DeviceId> = {
            let devices = self.devices.read().await;
            devices
                .iter()
                .filter(|d| d.name() != LOCAL_DEVICE_NAME)
                .map(|d| d.id().clone())
                .collect()
        };

        let mut changed = false;

        for id in &known {
            if !found.contains(id.as_str()) {
                // Ignore NotFound races with concurrent detaches.
                if self.detach_quiet(id).await.is_ok() {
                    changed = true;
                }
            }
        }

        let known_names: HashSet<&str> = known.iter().map(|id| id.as_str()).collect();
        for mount in mounts {
            if !known_names.contains(mount.name.as_str()) {
                self.register_quiet(DeviceId::new(mount.name), mount.root).await;
                changed = true;
            }
        }

        if changed {
            self.emit_list_changed().await;
        }
        changed
    }

    /// Start the polling watcher.
    ///
    /// Probes the mount set every `interval` and applies the diff. Probe
    /// failures are logged and skipped; a transiently unreadable mount root
    /// must not detach every device.
    pub fn watch(
        self: &Arc<Self>,
        probe: Arc<dyn MountProbe>,
        interval: Duration,
    ) -> DeviceWatcher {
        let registry = Arc::clone(self);
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match probe.mounts().await {
                    Ok(mounts) => {
                        registry.apply_mounts(mounts).await;
                    }
                    Err(e) => {
                        debug!(error = %e, "mount probe failed, skipping tick");
                    }
                }
            }
        });

        DeviceWatcher { token, handle }
    }
}

fn device_names(devices: &[Device]) -> Vec<String> {
    devices.iter().map(|d| d.name().to_string()).collect()
}

/// Handle to a running polling watcher.
pub struct DeviceWatcher {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl DeviceWatcher {
    /// Stop the watcher and wait for the poll loop to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        self.handle.await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_runtime::events::DEFAULT_EVENT_BUFFER_SIZE;

    fn mount(name: &str) -> Mount {
        Mount {
            name: name.to_string(),
            root: PathBuf::from("/volumes").join(name),
        }
    }

    fn registry_with_sub() -> (
        DeviceRegistry,
        tokio::sync::broadcast::Receiver<CoreEvent>,
    ) {
        let bus = EventBus::new(DEFAULT_EVENT_BUFFER_SIZE);
        let sub = bus.subscribe();
        (DeviceRegistry::new(bus), sub)
    }

    fn drain_device_events(
        sub: &mut tokio::sync::broadcast::Receiver<CoreEvent>,
    ) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = sub.try_recv() {
            if let CoreEvent::Device(e) = event {
                events.push(e);
            }
        }
        events
    }

    #[tokio::test]
    async fn test_discovery_order_is_stable() {
        let (registry, _sub) = registry_with_sub();

        registry
            .register_local(PathBuf::from("/data/library"))
            .await;
        registry
            .register(DeviceId::new("B_STICK"), PathBuf::from("/volumes/B_STICK"))
            .await;
        registry
            .register(DeviceId::new("A_STICK"), PathBuf::from("/volumes/A_STICK"))
            .await;

        // Discovery order, not lexicographic
        assert_eq!(
            registry.device_names().await,
            vec!["local", "B_STICK", "A_STICK"]
        );
    }

    #[tokio::test]
    async fn test_empty_registry_lists_nothing() {
        let (registry, _sub) = registry_with_sub();
        assert!(registry.list_devices().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_device_fails() {
        let (registry, _sub) = registry_with_sub();
        let result = registry.get(&DeviceId::new("GHOST")).await;
        assert!(matches!(result, Err(DeviceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_reregistering_is_idempotent() {
        let (registry, _sub) = registry_with_sub();

        let first = registry
            .register(DeviceId::new("USB_STICK"), PathBuf::from("/volumes/USB_STICK"))
            .await;
        let second = registry
            .register(DeviceId::new("USB_STICK"), PathBuf::from("/elsewhere"))
            .await;

        assert_eq!(first.root(), second.root());
        assert_eq!(registry.device_names().await.len(), 1);
    }

    #[tokio::test]
    async fn test_detach_cancels_token_and_removes() {
        let (registry, _sub) = registry_with_sub();

        let device = registry
            .register(DeviceId::new("USB_STICK"), PathBuf::from("/volumes/USB_STICK"))
            .await;
        let token = device.cancellation_token();

        registry.detach(device.id()).await.unwrap();

        assert!(token.is_cancelled());
        assert!(registry.get(device.id()).await.is_err());
    }

    #[tokio::test]
    async fn test_apply_mounts_coalesces_per_tick() {
        let (registry, mut sub) = registry_with_sub();
        registry.register_local(PathBuf::from("/data/library")).await;
        drain_device_events(&mut sub);

        // Two devices arriving in the same tick
        let changed = registry
            .apply_mounts(vec![mount("USB_STICK"), mount("CARD")])
            .await;
        assert!(changed);

        let events = drain_device_events(&mut sub);
        let attached = events
            .iter()
            .filter(|e| matches!(e, DeviceEvent::Attached { .. }))
            .count();
        assert_eq!(attached, 2);

        // Both arrivals share a single list notification
        let list_changes = events
            .iter()
            .filter(|e| matches!(e, DeviceEvent::ListChanged { .. }))
            .count();
        assert_eq!(list_changes, 1);

        assert_eq!(
            registry.device_names().await,
            vec!["local", "USB_STICK", "CARD"]
        );
    }

    #[tokio::test]
    async fn test_apply_mounts_detaches_vanished() {
        let (registry, _sub) = registry_with_sub();
        registry.register_local(PathBuf::from("/data/library")).await;
        registry.apply_mounts(vec![mount("USB_STICK")]).await;

        let device = registry.get(&DeviceId::new("USB_STICK")).await.unwrap();
        let token = device.cancellation_token();

        let changed = registry.apply_mounts(vec![]).await;
        assert!(changed);
        assert!(token.is_cancelled());
        // Local device never detaches from a probe diff
        assert_eq!(registry.device_names().await, vec!["local"]);
    }

    #[tokio::test]
    async fn test_apply_mounts_unchanged_reports_false() {
        let (registry, _sub) = registry_with_sub();
        registry.apply_mounts(vec![mount("USB_STICK")]).await;
        let changed = registry.apply_mounts(vec![mount("USB_STICK")]).await;
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_watcher_picks_up_probe_changes() {
        struct OneShotProbe;

        #[async_trait::async_trait]
        impl MountProbe for OneShotProbe {
            async fn mounts(&self) -> crate::error::Result<Vec<Mount>> {
                Ok(vec![Mount {
                    name: "USB_STICK".to_string(),
                    root: PathBuf::from("/volumes/USB_STICK"),
                }])
            }
        }

        let (registry, _sub) = registry_with_sub();
        let registry = Arc::new(registry);
        let watcher = registry.watch(Arc::new(OneShotProbe), Duration::from_millis(5));

        // Wait for at least one tick to land
        for _ in 0..100 {
            if !registry.device_names().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(registry.device_names().await, vec!["USB_STICK"]);
        watcher.shutdown().await;
    }
}
