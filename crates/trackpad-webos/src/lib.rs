//! LG webOS remote session.
//!
//! Provides:
//! - SSAP control protocol messages and pointer socket frames
//! - `WebOsClient` - `RemoteSession` over the TV's control and pointer sockets

pub mod client;
pub mod protocol;

pub use client::{WebOsClient, WebOsConfig};
pub use protocol::PointerFrame;
