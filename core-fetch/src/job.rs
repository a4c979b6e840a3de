//! # Fetch Job State Machine
//!
//! Lifecycle of one track acquisition from request to landed file.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Resolving → Downloading → Writing → Done
//!     ↓         ↓            ↓           ↓
//!     └─────────┴────────────┴───────────┴──→ Failed(cause)
//! ```
//!
//! `Failed` is reachable from every non-terminal state and always carries a
//! cause so the UI and logs can distinguish a dead source from a vanished
//! device or a full disk.

use crate::error::{FetchError, Result};
use core_device::DeviceId;
use core_library::TrackKey;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Requests
// ============================================================================

/// One caller-submitted acquisition request.
///
/// `request_id` is assigned by the caller and must be unique within its
/// batch; every event about this job carries it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub request_id: String,
    pub artist: String,
    pub title: String,
}

impl FetchRequest {
    pub fn new(
        request_id: impl Into<String>,
        artist: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            artist: artist.into(),
            title: title.into(),
        }
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// Why a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCause {
    /// The source had no candidate for the track.
    Resolution,
    /// The download broke after exhausting retries.
    Transfer,
    /// The target device detached mid-job.
    DeviceUnavailable,
    /// The bytes arrived but could not be written into place.
    Write,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCause::Resolution => "resolution",
            FailureCause::Transfer => "transfer",
            FailureCause::DeviceUnavailable => "device-unavailable",
            FailureCause::Write => "write",
        };
        write!(f, "{}", s)
    }
}

/// The current state of a fetch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state")]
pub enum FetchState {
    /// Accepted, waiting for a worker.
    Pending,
    /// Worker is asking the source for a candidate.
    Resolving,
    /// Bytes are streaming in.
    Downloading,
    /// Download complete, landing the file on the device.
    Writing,
    /// File landed and recorded in the index.
    Done,
    /// Terminal failure with its cause.
    Failed { cause: FailureCause },
}

impl FetchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchState::Done | FetchState::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchState::Pending => "pending",
            FetchState::Resolving => "resolving",
            FetchState::Downloading => "downloading",
            FetchState::Writing => "writing",
            FetchState::Done => "done",
            FetchState::Failed { .. } => "failed",
        }
    }

    fn can_transition_to(&self, next: FetchState) -> bool {
        // Failure is allowed out of any non-terminal state
        if matches!(next, FetchState::Failed { .. }) {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (FetchState::Pending, FetchState::Resolving)
                | (FetchState::Resolving, FetchState::Downloading)
                | (FetchState::Downloading, FetchState::Writing)
                | (FetchState::Writing, FetchState::Done)
        )
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchState::Failed { cause } => write!(f, "failed({})", cause),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

// ============================================================================
// Job
// ============================================================================

/// One acquisition job tracked by the pipeline.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub request_id: String,
    pub key: TrackKey,
    pub device: DeviceId,
    pub state: FetchState,
    /// Download progress, 0-100.
    pub percent: u8,
}

impl FetchJob {
    pub fn new(request_id: impl Into<String>, key: TrackKey, device: DeviceId) -> Self {
        Self {
            request_id: request_id.into(),
            key,
            device,
            state: FetchState::Pending,
            percent: 0,
        }
    }

    /// Move the job to `next`, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidTransition`] for any edge the state
    /// machine does not allow.
    pub fn transition(&mut self, next: FetchState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(FetchError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn fail(&mut self, cause: FailureCause) -> Result<()> {
        self.transition(FetchState::Failed { cause })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> FetchJob {
        FetchJob::new(
            "req-1",
            TrackKey::new("Daft Punk", "Aerodynamic"),
            DeviceId::new("USB"),
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = job();
        job.transition(FetchState::Resolving).unwrap();
        job.transition(FetchState::Downloading).unwrap();
        job.transition(FetchState::Writing).unwrap();
        job.transition(FetchState::Done).unwrap();
        assert!(job.state.is_terminal());
    }

    #[test]
    fn test_failure_from_any_non_terminal_state() {
        for advance in 0..4 {
            let mut job = job();
            let path = [
                FetchState::Resolving,
                FetchState::Downloading,
                FetchState::Writing,
            ];
            for state in path.iter().take(advance) {
                job.transition(*state).unwrap();
            }
            job.fail(FailureCause::Transfer).unwrap();
            assert_eq!(
                job.state,
                FetchState::Failed {
                    cause: FailureCause::Transfer
                }
            );
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = job();
        job.transition(FetchState::Resolving).unwrap();
        job.fail(FailureCause::Resolution).unwrap();

        assert!(job.transition(FetchState::Downloading).is_err());
        assert!(job.fail(FailureCause::Transfer).is_err());
    }

    #[test]
    fn test_skipping_states_rejected() {
        let mut job = job();
        assert!(matches!(
            job.transition(FetchState::Downloading),
            Err(FetchError::InvalidTransition { .. })
        ));
        assert!(job.transition(FetchState::Done).is_err());
    }
}
