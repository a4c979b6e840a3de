//! # Core Bridge
//!
//! Host-facing facade: commands in, push events out.
//!
//! ## Overview
//!
//! `CoreBridge` wires the registry, index, sync engine and fetch pipeline
//! onto one shared event bus and exposes the command surface a UI needs.
//! Commands answer directly; everything long-running reports through the
//! event stream a host obtains from [`CoreBridge::subscribe`].
//!
//! Browsing rebuilds a device's index on first touch, so a host never has
//! to sequence an explicit scan before its first query.

use crate::error::Result;
use core_device::{DeviceId, DeviceRegistry, DeviceWatcher, FsMountProbe};
use core_fetch::{BatchAcceptance, FetchPipeline, FetchRequest, TrackSource};
use core_library::{ConventionScanner, LibraryIndex, TrackCache};
use core_runtime::events::{CoreEvent, DeviceEvent, EventBus, EventStream, LibraryEvent};
use core_runtime::CoreConfig;
use core_sync::{SyncEngine, SyncStats};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Primary facade exposed to host applications.
pub struct CoreBridge {
    config: Arc<CoreConfig>,
    event_bus: EventBus,
    registry: Arc<DeviceRegistry>,
    index: Arc<LibraryIndex>,
    scanner: Arc<ConventionScanner>,
    sync: SyncEngine,
    fetch: FetchPipeline,
    selected: RwLock<Option<DeviceId>>,
    watcher: Mutex<Option<DeviceWatcher>>,
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl CoreBridge {
    /// Wire the core together. The local library is registered as a device
    /// immediately; removables appear once [`CoreBridge::start`] runs (or
    /// hosts drive [`DeviceRegistry::apply_mounts`] themselves in tests).
    pub async fn new(config: CoreConfig, source: Arc<dyn TrackSource>) -> Result<Self> {
        let config = Arc::new(config);
        let event_bus = EventBus::new(config.event_buffer);
        let registry = Arc::new(DeviceRegistry::new(event_bus.clone()));
        let index = Arc::new(LibraryIndex::new());

        registry.register_local(config.library_root.clone()).await;

        let cache = TrackCache::load(&config.cache_path).await?;
        let scanner = Arc::new(ConventionScanner::new(
            config.audio_extension.clone(),
            Arc::new(Mutex::new(cache)),
        ));

        let sync = SyncEngine::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            Arc::clone(&index),
            event_bus.clone(),
        );
        let fetch = FetchPipeline::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            Arc::clone(&index),
            event_bus.clone(),
            source,
        );

        Ok(Self {
            config,
            event_bus,
            registry,
            index,
            scanner,
            sync,
            fetch,
            selected: RwLock::new(None),
            watcher: Mutex::new(None),
            janitor: Mutex::new(None),
        })
    }

    /// Start background work: the mount poller and the detach janitor that
    /// drops a device's index once it is gone.
    pub async fn start(&self) {
        let probe = Arc::new(FsMountProbe::new(
            self.config.mount_root.clone(),
            self.config.ignored_mounts.clone(),
        ));
        let watcher = self.registry.watch(probe, self.config.poll_interval);
        *self.watcher.lock().await = Some(watcher);

        let index = Arc::clone(&self.index);
        let mut events = self.event_bus.subscribe();
        let janitor = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let CoreEvent::Device(DeviceEvent::Detached { name }) = event {
                    index.drop_device(&DeviceId::new(&name)).await;
                    debug!(device = %name, "index dropped for detached device");
                }
            }
        });
        *self.janitor.lock().await = Some(janitor);
        info!("core bridge started");
    }

    /// Stop background work. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(watcher) = self.watcher.lock().await.take() {
            watcher.shutdown().await;
        }
        if let Some(janitor) = self.janitor.lock().await.take() {
            janitor.abort();
        }
        info!("core bridge stopped");
    }

    /// A new event stream over everything the core publishes.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Device names in discovery order, local first.
    pub async fn list_devices(&self) -> Vec<String> {
        self.registry.device_names().await
    }

    /// Remember a device as the session context for the host's browsing.
    ///
    /// # Errors
    ///
    /// Fails if no such device is attached.
    pub async fn select_device(&self, device: &DeviceId) -> Result<()> {
        self.registry.get(device).await?;
        *self.selected.write().await = Some(device.clone());
        Ok(())
    }

    /// The device picked by the last [`CoreBridge::select_device`], if any.
    pub async fn selected_device(&self) -> Option<DeviceId> {
        self.selected.read().await.clone()
    }

    /// Artists on a device in stable lexicographic order, indexing the
    /// device first if it was never scanned.
    pub async fn load_artists(&self, device: &DeviceId) -> Result<Vec<String>> {
        self.ensure_indexed(device).await?;
        Ok(self.index.list_artists(device).await?)
    }

    /// Track titles for one artist on a device.
    pub async fn load_tracks(&self, device: &DeviceId, artist: &str) -> Result<Vec<String>> {
        self.ensure_indexed(device).await?;
        Ok(self.index.list_tracks(device, artist).await?)
    }

    /// Force a rescan of a device.
    pub async fn refresh(&self, device: &DeviceId) -> Result<()> {
        self.rebuild(device).await
    }

    /// Union-sync every online device's library onto every other device.
    /// Progress arrives through the event stream; the return value is the
    /// aggregate summary.
    pub async fn sync_all(&self) -> Result<SyncStats> {
        for device in self.registry.list_devices().await {
            if device.is_online() {
                self.ensure_indexed(device.id()).await?;
            }
        }
        Ok(self.sync.sync_all().await?)
    }

    /// Submit a batch of track acquisitions onto a device.
    ///
    /// Returns as soon as validation splits the batch; jobs run in the
    /// background and report per-request through the event stream.
    pub async fn fetch_tracks(
        &self,
        requests: Vec<FetchRequest>,
        device: &DeviceId,
    ) -> Result<BatchAcceptance> {
        self.ensure_indexed(device).await?;
        Ok(self.fetch.submit_batch(requests, device).await?)
    }

    /// The device registry, for hosts that drive discovery themselves.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Index the device if it has never been scanned.
    async fn ensure_indexed(&self, device: &DeviceId) -> Result<()> {
        if self.index.has_index(device).await {
            return Ok(());
        }
        self.rebuild(device).await
    }

    async fn rebuild(&self, device: &DeviceId) -> Result<()> {
        let record = self.registry.get(device).await?;
        let report = self
            .index
            .rebuild(device, record.root(), self.scanner.as_ref())
            .await?;

        if report.is_partial() {
            self.event_bus
                .emit(CoreEvent::Library(LibraryEvent::PartialScan {
                    device: device.to_string(),
                    skipped: report.skipped.len() as u64,
                }))
                .ok();
        }
        self.event_bus
            .emit(CoreEvent::Library(LibraryEvent::Reloaded {
                device: device.to_string(),
            }))
            .ok();
        Ok(())
    }
}
