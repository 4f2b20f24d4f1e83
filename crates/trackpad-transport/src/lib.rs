//! Transport layer between browser trackpads and the remote session.
//!
//! Provides:
//! - Frame decoding shared by both ends
//! - `CommandRelay` - One remote session per connection, commands in order
//! - WebSocket endpoint (feature: websocket)
//! - `TrackpadClient` - Native client for the endpoint

pub mod client;
pub mod protocol;
pub mod relay;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use client::{StatusStream, TrackpadClient};
pub use protocol::{Inbound, TransportError};
pub use relay::{CommandRelay, RelayTimeouts};

#[cfg(feature = "websocket")]
pub use websocket::{SessionFactory, create_ws_router};
