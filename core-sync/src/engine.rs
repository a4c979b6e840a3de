//! # Sync Engine
//!
//! Plans and executes track copies between devices.
//!
//! ## Overview
//!
//! Planning is a pure set difference over [`TrackKey`]s: for each target,
//! every source track the target lacks becomes a [`CopyOp`]. Tracks filed
//! under the unknown-identity sentinel are never planned; their identity is
//! a file stem, not a track, and copying them around would multiply noise.
//!
//! Execution runs ops on a semaphore-bounded pool. Each success lands the
//! file in the target's root and records it in the target's index; each
//! failure marks only its own op. A target detaching mid-run fails that
//! target's remaining ops with a device-unavailable reason while completed
//! copies stay valid.
//!
//! Progress and completion are published on the event bus; `Completed`
//! fires exactly once per session.

use crate::error::{Result, SyncError};
use crate::session::{CopyOp, CopyStatus, SyncSession, SyncState, SyncStats};
use core_device::{DeviceId, DeviceRegistry};
use core_library::{LibraryIndex, TrackKey};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::CoreConfig;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Source label carried by sessions planned over all devices.
pub const UNION_SOURCE: &str = "union";

/// Plans and runs sync sessions.
#[derive(Clone)]
pub struct SyncEngine {
    config: Arc<CoreConfig>,
    registry: Arc<DeviceRegistry>,
    index: Arc<LibraryIndex>,
    event_bus: EventBus,
}

impl SyncEngine {
    pub fn new(
        config: Arc<CoreConfig>,
        registry: Arc<DeviceRegistry>,
        index: Arc<LibraryIndex>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            registry,
            index,
            event_bus,
        }
    }

    /// Plan copies of every source track the targets lack.
    ///
    /// No copying happens here. Ops come out in (target, artist, title)
    /// order, so identical libraries always produce identical plans.
    ///
    /// # Errors
    ///
    /// Fails if the source or any target has no index yet.
    pub async fn plan(&self, source: &DeviceId, targets: &[DeviceId]) -> Result<SyncSession> {
        let source_entries: Vec<_> = self
            .index
            .entries(source)
            .await?
            .into_iter()
            .filter(|entry| !entry.key.is_unknown())
            .collect();

        let mut ops = Vec::new();
        for target in targets {
            if target == source {
                continue;
            }
            let existing: HashSet<TrackKey> = self
                .index
                .entries(target)
                .await?
                .into_iter()
                .map(|entry| entry.key)
                .collect();

            for entry in &source_entries {
                if !existing.contains(&entry.key) {
                    ops.push(CopyOp::new(
                        target.clone(),
                        entry.key.clone(),
                        entry.file_ref.clone(),
                    ));
                }
            }
        }

        debug!(source = %source, ops = ops.len(), "sync plan computed");
        Ok(SyncSession::new(source.to_string(), ops))
    }

    /// Plan the union of all online devices' tracks onto every device.
    ///
    /// Each missing track is sourced from the first device (in discovery
    /// order) that carries it; devices already holding a key keep their
    /// own copy untouched.
    ///
    /// # Errors
    ///
    /// Fails if any online device has no index yet.
    pub async fn plan_union(&self) -> Result<SyncSession> {
        let devices: Vec<_> = self
            .registry
            .list_devices()
            .await
            .into_iter()
            .filter(|d| d.is_online())
            .collect();

        // First device carrying a key wins as its source
        let mut union: BTreeMap<TrackKey, PathBuf> = BTreeMap::new();
        let mut holdings: Vec<(DeviceId, HashSet<TrackKey>)> = Vec::new();
        for device in &devices {
            let mut keys = HashSet::new();
            for entry in self.index.entries(device.id()).await? {
                if entry.key.is_unknown() {
                    continue;
                }
                union.entry(entry.key.clone()).or_insert(entry.file_ref);
                keys.insert(entry.key);
            }
            holdings.push((device.id().clone(), keys));
        }

        let mut ops = Vec::new();
        for (device, keys) in &holdings {
            for (key, source_ref) in &union {
                if !keys.contains(key) {
                    ops.push(CopyOp::new(device.clone(), key.clone(), source_ref.clone()));
                }
            }
        }

        debug!(devices = devices.len(), ops = ops.len(), "union plan computed");
        Ok(SyncSession::new(UNION_SOURCE, ops))
    }

    /// Execute a planned session.
    ///
    /// Returns the session with every op at a terminal status. The session
    /// itself ends `Done` even when individual ops failed; callers read the
    /// op statuses (or [`SyncSession::stats`]) for the casualty count.
    pub async fn run(&self, mut session: SyncSession) -> Result<SyncSession> {
        session.transition(SyncState::Copying)?;
        let total = session.ops.len() as u64;

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Started {
                session_id: session.id.to_string(),
                source: session.source.clone(),
                planned: total,
            }))
            .ok();
        info!(session = %session.id, planned = total, "sync session started");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_copies));
        let completed = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::with_capacity(session.ops.len());

        for (position, op) in session.ops.iter().enumerate() {
            let engine = self.clone();
            let op = op.clone();
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);
            let session_id = session.id.to_string();

            handles.push(tokio::spawn(async move {
                // Closed only if the engine is dropped mid-run
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (position, Err(SyncError::DeviceUnavailable {
                        device: op.target.to_string(),
                    }));
                };
                let result = engine.copy_one(&op).await;

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                engine
                    .event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Progress {
                        session_id,
                        completed: done,
                        total,
                        percent: ((done * 100) / total.max(1)) as u8,
                    }))
                    .ok();

                (position, result)
            }));
        }

        for handle in handles {
            let (position, result) = handle.await.map_err(|e| SyncError::Copy {
                path: String::new(),
                reason: format!("copy task panicked: {}", e),
            })?;
            session.ops[position].status = match result {
                Ok(_) => CopyStatus::Copied,
                Err(e) => {
                    warn!(session = %session.id, op = position, error = %e, "copy failed");
                    CopyStatus::Failed(e.to_string())
                }
            };
        }

        session.transition(SyncState::Done)?;
        let stats = session.stats();
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Completed {
                session_id: session.id.to_string(),
                copied: stats.copied,
                failed: stats.failed,
            }))
            .ok();
        info!(
            session = %session.id,
            copied = stats.copied,
            failed = stats.failed,
            "sync session completed"
        );

        Ok(session)
    }

    /// Plan and run a one-source sync in one call.
    pub async fn sync(&self, source: &DeviceId, targets: &[DeviceId]) -> Result<SyncSession> {
        let session = self.plan(source, targets).await?;
        self.run(session).await
    }

    /// Plan and run a union sync across all online devices.
    pub async fn sync_all(&self) -> Result<SyncStats> {
        let session = self.plan_union().await?;
        let session = self.run(session).await?;
        Ok(session.stats())
    }

    /// Copy one op's file onto its target and record it in the index.
    async fn copy_one(&self, op: &CopyOp) -> Result<PathBuf> {
        let device = self
            .registry
            .get(&op.target)
            .await
            .map_err(|_| SyncError::DeviceUnavailable {
                device: op.target.to_string(),
            })?;
        if !device.is_online() {
            return Err(SyncError::DeviceUnavailable {
                device: op.target.to_string(),
            });
        }

        let dest = device
            .root()
            .join(self.config.track_file_name(&op.key.artist, &op.key.title));

        tokio::select! {
            _ = device.cancelled() => Err(SyncError::DeviceUnavailable {
                device: op.target.to_string(),
            }),
            copied = tokio::fs::copy(&op.source_ref, &dest) => match copied {
                Ok(_) => {
                    self.index
                        .record_entry(&op.target, op.key.clone(), dest.clone())
                        .await;
                    debug!(target = %op.target, track = %op.key, "track copied");
                    Ok(dest)
                }
                Err(e) => Err(SyncError::Copy {
                    path: dest.display().to_string(),
                    reason: e.to_string(),
                }),
            },
        }
    }
}
