//! # Sync Engine Module
//!
//! Copies tracks between device libraries.
//!
//! ## Overview
//!
//! - **Session** (`session`): `SyncSession` lifecycle state machine with
//!   validated transitions and per-op `CopyStatus`
//! - **Engine** (`engine`): plan computation (set difference by track key),
//!   bounded-concurrency execution, union sync across all devices
//!
//! A session's ops fail independently; one unreadable file or one detached
//! target never aborts the rest of the plan.

pub mod engine;
pub mod error;
pub mod session;

pub use engine::{SyncEngine, UNION_SOURCE};
pub use error::{Result, SyncError};
pub use session::{CopyOp, CopyStatus, SyncSession, SyncSessionId, SyncState, SyncStats};
