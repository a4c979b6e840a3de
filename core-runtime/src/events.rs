//! # Event Bus System
//!
//! Provides an event-driven architecture for the Trackbay core using
//! `tokio::sync::broadcast`. This module enables decoupled communication
//! between core modules and the UI bridge through typed events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for different domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ DeviceModule ├──────────────>│           │
//! └──────────────┘               │           │
//!                                │ EventBus  │
//! ┌──────────────┐     emit      │ (broadcast│     subscribe    ┌────────────┐
//! │  SyncModule  ├──────────────>│  channel) ├─────────────────>│ UI bridge  │
//! └──────────────┘               │           │                  └────────────┘
//!                                │           │
//! ┌──────────────┐     emit      │           │     subscribe    ┌────────────┐
//! │ FetchModule  ├──────────────>│           ├─────────────────>│ Subscriber │
//! └──────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DeviceEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! let event = CoreEvent::Device(DeviceEvent::ListChanged {
//!     names: vec!["local".to_string(), "USB_STICK".to_string()],
//! });
//! event_bus.emit(event).ok();
//!
//! let received = subscriber.recv().await.unwrap();
//! # }
//! ```
//!
//! ## Error Handling
//!
//! The event bus uses `tokio::sync::broadcast`, which can produce two types
//! of receive errors:
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n`
//!   events. Non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped (shutdown).
//!
//! Slow subscribers lag instead of blocking producers, so a disconnected UI
//! never stalls a download or a sync run.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that fall behind by more than this many events receive
/// `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
///
/// Wraps the per-module event enums plus the human-readable notice channel
/// so one subscription covers everything the core reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Device attach/detach events
    Device(DeviceEvent),
    /// Library index events
    Library(LibraryEvent),
    /// Sync session events
    Sync(SyncEvent),
    /// Fetch pipeline events
    Fetch(FetchEvent),
    /// Human-readable transient message for the UI notice channel
    Notice {
        /// Message text to display.
        message: String,
        /// Severity used by the UI to pick a visual treatment.
        severity: EventSeverity,
    },
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Device(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Fetch(e) => e.description(),
            CoreEvent::Notice { .. } => "Notice",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Notice { severity, .. } => *severity,
            CoreEvent::Device(DeviceEvent::Detached { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Fetch(FetchEvent::Status {
                mood: Mood::Error, ..
            }) => EventSeverity::Error,
            CoreEvent::Device(DeviceEvent::Attached { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Fetch(FetchEvent::BatchCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Build a notice event.
    pub fn notice(message: impl Into<String>, severity: EventSeverity) -> Self {
        CoreEvent::Notice {
            message: message.into(),
            severity,
        }
    }
}

/// Severity attached to events and notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

/// Visual mood attached to per-request status events.
///
/// Maps directly onto the progress-bar styling the UI applies to a fetch
/// row: `Normal` while in flight, `Good` on success, `Error` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    /// In-progress, nothing wrong
    Normal,
    /// Terminal success
    Good,
    /// Terminal failure
    Error,
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mood::Normal => "normal",
            Mood::Good => "good",
            Mood::Error => "error",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Device Events
// ============================================================================

/// Events related to storage device discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DeviceEvent {
    /// A new device was discovered and registered.
    Attached {
        /// The device name.
        name: String,
    },
    /// A device went offline.
    Detached {
        /// The device name.
        name: String,
    },
    /// The device list changed.
    ///
    /// Delivered at-least-once; multiple changes within one poll tick are
    /// coalesced into a single notification.
    ListChanged {
        /// Current device names in discovery order.
        names: Vec<String>,
    },
}

impl DeviceEvent {
    fn description(&self) -> &str {
        match self {
            DeviceEvent::Attached { .. } => "Device attached",
            DeviceEvent::Detached { .. } => "Device detached",
            DeviceEvent::ListChanged { .. } => "Device list changed",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to library index changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A device's index was rebuilt and readers should refresh.
    Reloaded {
        /// The device whose index changed.
        device: String,
    },
    /// A rebuild finished but skipped unreadable storage.
    PartialScan {
        /// The device whose scan degraded.
        device: String,
        /// Number of files that could not be read.
        skipped: u64,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::Reloaded { .. } => "Library reloaded",
            LibraryEvent::PartialScan { .. } => "Library scan degraded",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to sync sessions between devices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A sync session started copying.
    Started {
        /// The session ID.
        session_id: String,
        /// The canonical source device.
        source: String,
        /// Number of planned copy operations across all targets.
        planned: u64,
    },
    /// Incremental progress during a sync session.
    Progress {
        /// The session ID.
        session_id: String,
        /// Operations that reached a terminal state so far.
        completed: u64,
        /// Total planned operations.
        total: u64,
        /// Progress percentage (0-100).
        percent: u8,
    },
    /// A sync session finished; emitted exactly once per session.
    Completed {
        /// The session ID.
        session_id: String,
        /// Number of successful copies.
        copied: u64,
        /// Number of failed copy operations.
        failed: u64,
    },
    /// A sync session aborted before reaching its plan's end.
    Failed {
        /// The session ID.
        session_id: String,
        /// Human-readable reason.
        message: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Progress { .. } => "Sync in progress",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
        }
    }
}

// ============================================================================
// Fetch Events
// ============================================================================

/// Events related to track fetch jobs.
///
/// All per-job events carry the caller-assigned `request_id` so the UI can
/// map them back to the exact row that submitted the request. Events for one
/// request are delivered in the order the job's state actually transitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum FetchEvent {
    /// Job status/mood changed.
    Status {
        /// Caller-assigned request correlation ID.
        request_id: String,
        /// Visual mood for the row.
        mood: Mood,
    },
    /// Download progress for a job.
    ///
    /// Emitted only when the integer percent advances, never per byte.
    Progress {
        /// Caller-assigned request correlation ID.
        request_id: String,
        /// Progress percentage (0-100).
        percent: u8,
    },
    /// All jobs of a batch reached a terminal state; fires exactly once.
    BatchCompleted {
        /// The batch ID assigned at submission.
        batch_id: String,
        /// The target device of the batch.
        device: String,
        /// Jobs that finished successfully.
        completed: u64,
        /// Jobs that failed.
        failed: u64,
    },
}

impl FetchEvent {
    fn description(&self) -> &str {
        match self {
            FetchEvent::Status { .. } => "Fetch status changed",
            FetchEvent::Progress { .. } => "Fetch progress",
            FetchEvent::BatchCompleted { .. } => "Fetch batch completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Shared broadcast channel every core module publishes to.
///
/// Built on `tokio::sync::broadcast`: cloning the bus gives another
/// producer, every `subscribe()` gives an independent receiver, sends never
/// block, and a subscriber that falls behind gets `RecvError::Lagged`
/// instead of stalling producers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers. Producers treat the
    /// no-subscriber case as non-fatal: fire-and-forget callers may stop
    /// listening at any time.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all
    /// future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Predicate deciding which events a stream passes through.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// Provides a more ergonomic API for consumers that only care about one
/// event domain, e.g. the fetch screen filtering for `CoreEvent::Fetch`.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events, `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            let Some(filter) = &self.filter else {
                return Ok(event);
            };
            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };
                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
