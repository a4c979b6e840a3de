//! # Core Bridge Module
//!
//! UI-facing facade over the Trackbay core.
//!
//! Hosts construct a [`CoreBridge`] with their configuration and a
//! [`TrackSource`](core_fetch::TrackSource) implementation, call commands on
//! it, and consume push events from [`CoreBridge::subscribe`].

pub mod bridge;
pub mod error;

pub use bridge::CoreBridge;
pub use error::{BridgeError, Result};
