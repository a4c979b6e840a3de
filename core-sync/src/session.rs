//! # Sync Session State Machine
//!
//! Tracks the lifecycle of one copy plan from planning to completion.
//!
//! ## State Machine
//!
//! ```text
//! Planning → Copying → Done
//!     ↓         ↓
//!     └──────→ Failed
//! ```
//!
//! A session is planned as a set of [`CopyOp`]s, each of which reaches its
//! own terminal status during the run. Individual op failures never fail the
//! session; `Failed` is reserved for the run aborting before the plan's end.

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use core_device::DeviceId;
use core_library::TrackKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncSessionId(Uuid);

impl SyncSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The current state of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Plan computed, nothing copied yet.
    Planning,
    /// Copy operations are executing.
    Copying,
    /// The run reached the plan's end; op statuses carry the details.
    Done,
    /// The run aborted before reaching the plan's end.
    Failed,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Done | SyncState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Planning => "planning",
            SyncState::Copying => "copying",
            SyncState::Done => "done",
            SyncState::Failed => "failed",
        }
    }

    fn can_transition_to(&self, next: SyncState) -> bool {
        matches!(
            (self, next),
            (SyncState::Planning, SyncState::Copying)
                | (SyncState::Planning, SyncState::Failed)
                | (SyncState::Copying, SyncState::Done)
                | (SyncState::Copying, SyncState::Failed)
        )
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Copy Operations
// ============================================================================

/// Terminal status of one copy operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    /// Not yet executed.
    Planned,
    /// File landed on the target and was recorded in its index.
    Copied,
    /// This op failed; the rest of the plan is unaffected.
    Failed(String),
}

/// One planned file copy onto a target device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOp {
    /// Device receiving the file.
    pub target: DeviceId,
    /// Track identity being synced.
    pub key: TrackKey,
    /// Source file location.
    pub source_ref: PathBuf,
    pub status: CopyStatus,
}

impl CopyOp {
    pub fn new(target: DeviceId, key: TrackKey, source_ref: PathBuf) -> Self {
        Self {
            target,
            key,
            source_ref,
            status: CopyStatus::Planned,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Aggregate counts over a session's ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStats {
    pub planned: u64,
    pub copied: u64,
    pub failed: u64,
}

/// One sync run: a copy plan plus its lifecycle state.
#[derive(Debug, Clone)]
pub struct SyncSession {
    pub id: SyncSessionId,
    /// Label of where the plan's tracks come from; a device name, or
    /// `union` for an all-device run.
    pub source: String,
    pub state: SyncState,
    pub ops: Vec<CopyOp>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncSession {
    pub fn new(source: impl Into<String>, ops: Vec<CopyOp>) -> Self {
        let now = Utc::now();
        Self {
            id: SyncSessionId::new(),
            source: source.into(),
            state: SyncState::Planning,
            ops,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the session to `next`, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTransition`] for any edge the state
    /// machine does not allow.
    pub fn transition(&mut self, next: SyncState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SyncError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Aggregate counts over the current op statuses.
    pub fn stats(&self) -> SyncStats {
        let mut stats = SyncStats {
            planned: self.ops.len() as u64,
            ..SyncStats::default()
        };
        for op in &self.ops {
            match op.status {
                CopyStatus::Copied => stats.copied += 1,
                CopyStatus::Failed(_) => stats.failed += 1,
                CopyStatus::Planned => {}
            }
        }
        stats
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(target: &str, artist: &str, title: &str) -> CopyOp {
        CopyOp::new(
            DeviceId::new(target),
            TrackKey::new(artist, title),
            PathBuf::from(format!("/lib/{} - {}.mp3", artist, title)),
        )
    }

    #[test]
    fn test_valid_lifecycle() {
        let mut session = SyncSession::new("local", vec![op("USB", "Daft Punk", "Aerodynamic")]);
        assert_eq!(session.state, SyncState::Planning);

        session.transition(SyncState::Copying).unwrap();
        session.transition(SyncState::Done).unwrap();
        assert!(session.state.is_terminal());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut session = SyncSession::new("local", vec![]);

        // Cannot finish without copying first
        assert!(matches!(
            session.transition(SyncState::Done),
            Err(SyncError::InvalidTransition { .. })
        ));

        session.transition(SyncState::Copying).unwrap();
        session.transition(SyncState::Failed).unwrap();

        // Terminal states are final
        assert!(session.transition(SyncState::Copying).is_err());
        assert!(session.transition(SyncState::Done).is_err());
    }

    #[test]
    fn test_planning_can_fail_directly() {
        let mut session = SyncSession::new("local", vec![]);
        session.transition(SyncState::Failed).unwrap();
        assert_eq!(session.state, SyncState::Failed);
    }

    #[test]
    fn test_stats_aggregate_op_statuses() {
        let mut session = SyncSession::new(
            "local",
            vec![
                op("USB", "Daft Punk", "Aerodynamic"),
                op("USB", "Daft Punk", "One more time"),
                op("USB", "Zhu", "Faded"),
            ],
        );
        session.ops[0].status = CopyStatus::Copied;
        session.ops[1].status = CopyStatus::Failed("disk full".to_string());

        let stats = session.stats();
        assert_eq!(stats.planned, 3);
        assert_eq!(stats.copied, 1);
        assert_eq!(stats.failed, 1);
    }
}
