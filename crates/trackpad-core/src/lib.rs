//! Core abstractions for the TV trackpad bridge.
//!
//! This crate provides the fundamental building blocks:
//! - `BridgeConfig` - Immutable startup configuration
//! - `GestureClassifier` - Pointer contacts to discrete gestures
//! - `DeltaScheduler` - Fixed-rate flushing of accumulated motion
//! - `CommandMessage` - Wire-level command frames
//! - `RemoteSession` - The remote device seam
//! - `pipeline` - Client-side driver tying classifier and scheduler together

pub mod command;
pub mod config;
pub mod gesture;
pub mod pipeline;
pub mod scheduler;
pub mod traits;

pub use command::{CommandMessage, FrameError};
pub use config::{BridgeConfig, ConfigError, FlushPolicy, GestureConfig};
pub use gesture::{ContactEvent, ContactId, GestureClassifier, GestureEvent, Point};
pub use pipeline::{CommandSink, InputPipeline};
pub use scheduler::{Delta, DeltaScheduler};
pub use traits::{
    DeviceState, EventCallback, RemoteSession, SessionError, SessionEvent, SessionState,
};
