//! Wire-level command frames sent from the input surface to the relay.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Command from the trackpad to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandMessage {
    /// Relative pointer motion.
    Move { dx: f64, dy: f64 },
    /// Scroll by the given amount.
    Scroll { dx: f64, dy: f64 },
    /// Single tap.
    Click,
    /// Press and hold.
    LongPress,
}

/// Why an inbound frame produced no command.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Malformed command frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unknown command type: {0}")]
    UnknownType(String),
}

impl FrameError {
    /// Unknown types are tolerated quietly; malformed frames deserve a warning.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

const KNOWN_TYPES: [&str; 4] = ["move", "scroll", "click", "longpress"];

impl CommandMessage {
    /// Parse a text frame.
    ///
    /// Frames whose `type` is not a known command are reported as
    /// `UnknownType` so callers can ignore them separately from frames that
    /// are broken. Extra fields (such as `button`) are ignored.
    ///
    /// # Errors
    /// Returns `FrameError` if the frame is not a usable command.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        if let Some(kind) = value.get("type").and_then(Value::as_str) {
            if !KNOWN_TYPES.contains(&kind) {
                return Err(FrameError::UnknownType(kind.to_string()));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Serialize to a JSON text frame.
    #[must_use]
    pub fn to_json(&self) -> String {
        // Only finite floats and unit variants; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Wire name of the command type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::Scroll { .. } => "scroll",
            Self::Click => "click",
            Self::LongPress => "longpress",
        }
    }
}
