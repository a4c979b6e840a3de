//! # Fetch Pipeline
//!
//! Batch track acquisition onto a device.
//!
//! ## Overview
//!
//! `submit_batch` validates requests up front and answers immediately with
//! the accept/reject split; rejected requests never become jobs. Accepted
//! jobs run on a semaphore-bounded worker pool so one slow download never
//! blocks the rest of the batch.
//!
//! Per job: resolve a candidate, stream bytes into `<name>.part`, rename
//! into place, record the entry in the device's index. Downloads retry on
//! transfer errors; resolution and write failures do not. Progress events
//! fire only when the integer percent advances. A device detaching mid-job
//! cancels the job through the device's token and removes the partial file
//! so nothing half-written is ever recorded.
//!
//! One `BatchCompleted` event fires after every job of a batch reaches a
//! terminal state.

use crate::error::{FetchError, Result};
use crate::job::{FailureCause, FetchJob, FetchRequest, FetchState};
use crate::source::TrackSource;
use core_device::{Device, DeviceId, DeviceRegistry};
use core_library::{LibraryIndex, TrackKey};
use core_runtime::events::{CoreEvent, EventBus, FetchEvent, Mood};
use core_runtime::CoreConfig;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// Submission Types
// ============================================================================

/// A request turned away at validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRequest {
    pub request_id: String,
    pub reason: String,
}

/// Immediate answer to a batch submission.
///
/// Every submitted request lands in exactly one of the two lists.
#[derive(Debug, Clone)]
pub struct BatchAcceptance {
    pub batch_id: String,
    /// Request ids now running as jobs.
    pub accepted: Vec<String>,
    pub rejected: Vec<RejectedRequest>,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Runs fetch batches against a [`TrackSource`].
#[derive(Clone)]
pub struct FetchPipeline {
    config: Arc<CoreConfig>,
    registry: Arc<DeviceRegistry>,
    index: Arc<LibraryIndex>,
    event_bus: EventBus,
    source: Arc<dyn TrackSource>,
    jobs: Arc<RwLock<HashMap<String, FetchJob>>>,
}

impl FetchPipeline {
    pub fn new(
        config: Arc<CoreConfig>,
        registry: Arc<DeviceRegistry>,
        index: Arc<LibraryIndex>,
        event_bus: EventBus,
        source: Arc<dyn TrackSource>,
    ) -> Self {
        Self {
            config,
            registry,
            index,
            event_bus,
            source,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validate a batch and start jobs for the accepted requests.
    ///
    /// Returns before any download begins. Rejections carry the reason per
    /// request: blank artist or title, blank request id, or a request id
    /// already used within the batch.
    ///
    /// # Errors
    ///
    /// Fails only when the target device is unknown or offline; individual
    /// bad requests are reported through [`BatchAcceptance::rejected`].
    pub async fn submit_batch(
        &self,
        requests: Vec<FetchRequest>,
        device: &DeviceId,
    ) -> Result<BatchAcceptance> {
        let device = self
            .registry
            .get(device)
            .await
            .map_err(|_| FetchError::DeviceUnavailable {
                device: device.to_string(),
            })?;
        if !device.is_online() {
            return Err(FetchError::DeviceUnavailable {
                device: device.id().to_string(),
            });
        }

        let batch_id = Uuid::new_v4().to_string();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();

        {
            let mut jobs = self.jobs.write().await;
            for request in requests {
                if let Err(reason) = validate_request(&request, &seen_ids) {
                    rejected.push(RejectedRequest {
                        request_id: request.request_id,
                        reason,
                    });
                    continue;
                }
                seen_ids.insert(request.request_id.clone());

                let key = TrackKey::new(&request.artist, &request.title);
                jobs.insert(
                    request.request_id.clone(),
                    FetchJob::new(&request.request_id, key, device.id().clone()),
                );
                accepted.push(request.request_id.clone());

                self.event_bus
                    .emit(CoreEvent::Fetch(FetchEvent::Status {
                        request_id: request.request_id,
                        mood: Mood::Normal,
                    }))
                    .ok();
            }
        }

        info!(
            batch = %batch_id,
            device = %device.id(),
            accepted = accepted.len(),
            rejected = rejected.len(),
            "fetch batch submitted"
        );

        let acceptance = BatchAcceptance {
            batch_id: batch_id.clone(),
            accepted: accepted.clone(),
            rejected,
        };

        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.run_batch(batch_id, device, accepted).await;
        });

        Ok(acceptance)
    }

    /// Current view of one job.
    pub async fn job_snapshot(&self, request_id: &str) -> Option<FetchJob> {
        self.jobs.read().await.get(request_id).cloned()
    }

    /// Current view of all tracked jobs.
    pub async fn jobs(&self) -> Vec<FetchJob> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// Supervise one batch: run all jobs, then report completion once.
    async fn run_batch(&self, batch_id: String, device: Device, request_ids: Vec<String>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fetches));
        let mut handles = Vec::with_capacity(request_ids.len());

        for request_id in request_ids {
            let pipeline = self.clone();
            let device = device.clone();
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return false;
                };
                pipeline.run_job(&request_id, &device).await
            }));
        }

        let mut completed = 0u64;
        let mut failed = 0u64;
        for handle in handles {
            match handle.await {
                Ok(true) => completed += 1,
                _ => failed += 1,
            }
        }

        info!(batch = %batch_id, completed, failed, "fetch batch finished");
        self.event_bus
            .emit(CoreEvent::Fetch(FetchEvent::BatchCompleted {
                batch_id,
                device: device.id().to_string(),
                completed,
                failed,
            }))
            .ok();
    }

    /// Drive one job to a terminal state. Returns whether it succeeded.
    async fn run_job(&self, request_id: &str, device: &Device) -> bool {
        match self.acquire_track(request_id, device).await {
            Ok(()) => {
                self.event_bus
                    .emit(CoreEvent::Fetch(FetchEvent::Status {
                        request_id: request_id.to_string(),
                        mood: Mood::Good,
                    }))
                    .ok();
                true
            }
            Err(e) => {
                warn!(request = request_id, error = %e, "fetch job failed");
                self.mark_failed(request_id, failure_cause(&e)).await;
                self.event_bus
                    .emit(CoreEvent::Fetch(FetchEvent::Status {
                        request_id: request_id.to_string(),
                        mood: Mood::Error,
                    }))
                    .ok();
                false
            }
        }
    }

    async fn acquire_track(&self, request_id: &str, device: &Device) -> Result<()> {
        let key = match self.jobs.read().await.get(request_id) {
            Some(job) => job.key.clone(),
            None => return Err(FetchError::Validation {
                reason: format!("unknown request {}", request_id),
            }),
        };

        self.transition(request_id, FetchState::Resolving).await?;
        let candidate = tokio::select! {
            _ = device.cancelled() => {
                return Err(FetchError::DeviceUnavailable {
                    device: device.id().to_string(),
                });
            }
            resolved = self.source.resolve(&key.artist, &key.title) => resolved?,
        };
        let Some(candidate) = candidate else {
            return Err(FetchError::Resolution {
                artist: key.artist.clone(),
                title: key.title.clone(),
            });
        };
        debug!(request = request_id, locator = %candidate.locator, "candidate resolved");

        self.transition(request_id, FetchState::Downloading).await?;
        let dest = device
            .root()
            .join(self.config.track_file_name(&key.artist, &key.title));
        let part = part_path(&dest);

        // Transfer errors restart the download; other causes escalate
        let attempts = self.config.fetch_retry_attempts.max(1);
        let mut last_error = None;
        let mut downloaded = false;
        for attempt in 1..=attempts {
            match self.download_to_part(request_id, device, &candidate, &part).await {
                Ok(()) => {
                    downloaded = true;
                    break;
                }
                Err(e @ FetchError::Transfer { .. }) => {
                    debug!(request = request_id, attempt, error = %e, "transfer error, retrying");
                    last_error = Some(e);
                }
                Err(e) => {
                    remove_part(&part).await;
                    return Err(e);
                }
            }
        }
        if !downloaded {
            remove_part(&part).await;
            return Err(last_error.unwrap_or(FetchError::Transfer {
                reason: "download never started".to_string(),
            }));
        }

        self.transition(request_id, FetchState::Writing).await?;
        if device.cancellation_token().is_cancelled() {
            remove_part(&part).await;
            return Err(FetchError::DeviceUnavailable {
                device: device.id().to_string(),
            });
        }
        if let Err(e) = tokio::fs::rename(&part, &dest).await {
            remove_part(&part).await;
            return Err(FetchError::Write {
                path: dest.display().to_string(),
                reason: e.to_string(),
            });
        }

        self.index
            .record_entry(device.id(), key.clone(), dest.clone())
            .await;
        self.transition(request_id, FetchState::Done).await?;
        info!(request = request_id, track = %key, device = %device.id(), "track fetched");
        Ok(())
    }

    /// Stream the candidate's bytes into the partial file, emitting
    /// coalesced progress along the way.
    async fn download_to_part(
        &self,
        request_id: &str,
        device: &Device,
        candidate: &crate::source::SourceCandidate,
        part: &Path,
    ) -> Result<()> {
        let mut stream = self.source.download(candidate).await?;
        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| FetchError::Write {
                path: part.display().to_string(),
                reason: e.to_string(),
            })?;

        let total = candidate.total_bytes.max(1);
        let mut received: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = device.cancelled() => {
                    return Err(FetchError::DeviceUnavailable {
                        device: device.id().to_string(),
                    });
                }
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;

            file.write_all(&chunk).await.map_err(|e| FetchError::Write {
                path: part.display().to_string(),
                reason: e.to_string(),
            })?;
            received += chunk.len() as u64;

            // 100 is reserved for a complete download
            let percent = (((received * 100) / total) as u8).min(99);
            self.advance_percent(request_id, percent).await;
        }

        file.flush().await.map_err(|e| FetchError::Write {
            path: part.display().to_string(),
            reason: e.to_string(),
        })?;
        self.advance_percent(request_id, 100).await;
        Ok(())
    }

    /// Record a validated state transition on the tracked job.
    async fn transition(&self, request_id: &str, next: FetchState) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(request_id) {
            Some(job) => job.transition(next),
            None => Ok(()),
        }
    }

    async fn mark_failed(&self, request_id: &str, cause: FailureCause) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(request_id) {
            // Only invalid if already terminal, which cannot happen here
            job.fail(cause).ok();
        }
    }

    /// Bump the job's percent, emitting only when the integer advances.
    async fn advance_percent(&self, request_id: &str, percent: u8) {
        {
            let mut jobs = self.jobs.write().await;
            let Some(job) = jobs.get_mut(request_id) else {
                return;
            };
            if percent <= job.percent {
                return;
            }
            job.percent = percent;
        }
        self.event_bus
            .emit(CoreEvent::Fetch(FetchEvent::Progress {
                request_id: request_id.to_string(),
                percent,
            }))
            .ok();
    }
}

fn validate_request(
    request: &FetchRequest,
    seen_ids: &HashSet<String>,
) -> std::result::Result<(), String> {
    if request.request_id.trim().is_empty() {
        return Err("empty request id".to_string());
    }
    if seen_ids.contains(&request.request_id) {
        return Err("duplicate request id".to_string());
    }
    if request.artist.trim().is_empty() {
        return Err("empty artist".to_string());
    }
    if request.title.trim().is_empty() {
        return Err("empty title".to_string());
    }
    Ok(())
}

fn failure_cause(error: &FetchError) -> FailureCause {
    match error {
        FetchError::Resolution { .. } => FailureCause::Resolution,
        FetchError::DeviceUnavailable { .. } => FailureCause::DeviceUnavailable,
        FetchError::Write { .. } => FailureCause::Write,
        _ => FailureCause::Transfer,
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

async fn remove_part(part: &Path) {
    tokio::fs::remove_file(part).await.ok();
}
