//! Session lifecycle management for remote devices.
//!
//! Provides:
//! - `SessionLifecycle` - Own one remote session from open to close
//! - `StatusNotification` - Human-readable connection status
//! - `RecordingSession` - Device-free session (feature: recording)

pub mod lifecycle;
pub mod status;

#[cfg(feature = "recording")]
pub mod recording;

pub use lifecycle::{CloseReason, LifecycleState, PointerOp, SessionLifecycle, StateObserver};
pub use status::StatusNotification;

#[cfg(feature = "recording")]
pub use recording::{RecordedOp, RecordingBehavior, RecordingHandle, RecordingSession};
