//! SSAP control messages and pointer socket frames.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use trackpad_core::DeviceState;

/// Request id used for the registration handshake.
pub const REGISTER_ID: &str = "register_0";

/// Service URIs used by the bridge.
pub mod uri {
    pub const POINTER_SOCKET: &str = "ssap://com.webos.service.networkinput/getPointerInputSocket";
    pub const FOREGROUND_APP: &str = "ssap://com.webos.applicationManager/getForegroundAppInfo";
    pub const VOLUME: &str = "ssap://audio/getVolume";
    pub const POWER_STATE: &str = "ssap://com.webos.service.tvpower/power/getPowerState";
    pub const LIST_APPS: &str = "ssap://com.webos.applicationManager/listApps";
    pub const LIST_INPUTS: &str = "ssap://tv/getExternalInputList";
}

/// Subscriptions opened after registration.
pub const SUBSCRIPTIONS: [&str; 3] = [uri::FOREGROUND_APP, uri::VOLUME, uri::POWER_STATE];

/// One-shot catalog requests issued after registration.
pub const CATALOGS: [&str; 2] = [uri::LIST_APPS, uri::LIST_INPUTS];

const PERMISSIONS: [&str; 12] = [
    "LAUNCH",
    "CONTROL_AUDIO",
    "CONTROL_DISPLAY",
    "CONTROL_INPUT_JOYSTICK",
    "CONTROL_INPUT_MEDIA_PLAYBACK",
    "CONTROL_MOUSE_AND_KEYBOARD",
    "CONTROL_POWER",
    "READ_APP_STATUS",
    "READ_CURRENT_CHANNEL",
    "READ_INPUT_DEVICE_LIST",
    "READ_INSTALLED_APPS",
    "READ_POWER_STATE",
];

/// Outgoing control message.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Request {
    /// Registration with a pre-provisioned client key.
    #[must_use]
    pub fn register(client_key: &str) -> Self {
        Self {
            kind: "register",
            id: REGISTER_ID.to_string(),
            uri: None,
            payload: Some(json!({
                "forcePairing": false,
                "pairingType": "PROMPT",
                "client-key": client_key,
                "manifest": {
                    "manifestVersion": 1,
                    "appVersion": "1.1",
                    "permissions": PERMISSIONS,
                },
            })),
        }
    }

    /// One-shot request.
    #[must_use]
    pub const fn request(id: String, uri: &'static str) -> Self {
        Self {
            kind: "request",
            id,
            uri: Some(uri),
            payload: None,
        }
    }

    /// Subscription; the TV keeps answering under the same id.
    #[must_use]
    pub const fn subscribe(id: String, uri: &'static str) -> Self {
        Self {
            kind: "subscribe",
            id,
            uri: Some(uri),
            payload: None,
        }
    }
}

/// Incoming control message.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Option<String>,
    #[serde(default)]
    pub payload: Value,
    pub error: Option<String>,
}

impl Response {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind == "error" || self.payload.get("returnValue") == Some(&Value::Bool(false))
    }

    #[must_use]
    pub fn error_text(&self) -> String {
        self.error
            .clone()
            .or_else(|| {
                self.payload
                    .get("errorText")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| "unknown error".to_string())
    }

    /// Pointer socket URL from a `getPointerInputSocket` reply.
    #[must_use]
    pub fn socket_path(&self) -> Option<&str> {
        self.payload.get("socketPath").and_then(Value::as_str)
    }
}

/// Frame on the pointer input socket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerFrame {
    Move { dx: f64, dy: f64, drag: bool },
    Scroll { dx: f64, dy: f64 },
    Click,
}

impl PointerFrame {
    /// Encode as the TV's `key:value` line format, terminated by a blank line.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        match *self {
            Self::Move { dx, dy, drag } => {
                let _ = write!(out, "type:move\ndx:{dx}\ndy:{dy}\ndown:{}\n", u8::from(drag));
            }
            Self::Scroll { dx, dy } => {
                let _ = write!(out, "type:scroll\ndx:{dx}\ndy:{dy}\n");
            }
            Self::Click => out.push_str("type:click\n"),
        }
        out.push('\n');
        out
    }
}

fn keyed_catalog(items: Option<&Value>) -> Option<std::collections::BTreeMap<String, Value>> {
    let items = items?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| {
                let id = item.get("id")?.as_str()?;
                Some((id.to_string(), item.clone()))
            })
            .collect(),
    )
}

/// Fold a subscription payload into `state`. Returns true if anything changed.
pub fn apply_update(state: &mut DeviceState, service: &str, payload: &Value) -> bool {
    let before = state.clone();
    match service {
        uri::FOREGROUND_APP => {
            if let Some(app) = payload.get("appId").and_then(Value::as_str) {
                state.current_app_id = Some(app.to_string());
            }
        }
        uri::VOLUME => {
            // Newer firmware nests everything under volumeStatus.
            let status = payload.get("volumeStatus").unwrap_or(payload);
            if let Some(volume) = status.get("volume").and_then(Value::as_u64) {
                state.volume = u32::try_from(volume).ok();
            }
            if let Some(muted) = status
                .get("muteStatus")
                .or_else(|| status.get("muted"))
                .and_then(Value::as_bool)
            {
                state.muted = Some(muted);
            }
            if let Some(output) = status
                .get("soundOutput")
                .or_else(|| payload.get("scenario"))
                .and_then(Value::as_str)
            {
                state.sound_output = Some(output.to_string());
            }
        }
        uri::POWER_STATE => {
            if let Some(power) = payload.get("state").and_then(Value::as_str) {
                state.power_state = Some(power.to_string());
            }
        }
        uri::LIST_APPS => {
            if let Some(apps) = keyed_catalog(payload.get("apps")) {
                state.apps = apps;
            }
        }
        uri::LIST_INPUTS => {
            if let Some(inputs) = keyed_catalog(payload.get("devices")) {
                state.inputs = inputs;
            }
        }
        _ => {}
    }
    *state != before
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_frames() {
        assert_eq!(
            PointerFrame::Move { dx: 3.0, dy: -4.5, drag: false }.encode(),
            "type:move\ndx:3\ndy:-4.5\ndown:0\n\n"
        );
        assert_eq!(
            PointerFrame::Scroll { dx: 0.0, dy: 12.0 }.encode(),
            "type:scroll\ndx:0\ndy:12\n\n"
        );
        assert_eq!(PointerFrame::Click.encode(), "type:click\n\n");
    }

    #[test]
    fn test_register_carries_key() {
        let json = serde_json::to_value(Request::register("secret")).unwrap();
        assert_eq!(json["type"], "register");
        assert_eq!(json["id"], REGISTER_ID);
        assert_eq!(json["payload"]["client-key"], "secret");
        assert!(json.get("uri").is_none());
    }

    #[test]
    fn test_volume_update_both_shapes() {
        let mut state = DeviceState::default();
        assert!(apply_update(
            &mut state,
            uri::VOLUME,
            &json!({"volume": 10, "muted": false, "scenario": "mastervolume_tv_speaker"})
        ));
        assert_eq!(state.volume, Some(10));

        assert!(apply_update(
            &mut state,
            uri::VOLUME,
            &json!({
                "volumeStatus": {"volume": 14, "muteStatus": true, "soundOutput": "tv_speaker"}
            })
        ));
        assert_eq!(state.volume, Some(14));
        assert_eq!(state.muted, Some(true));
        assert_eq!(state.sound_output.as_deref(), Some("tv_speaker"));
    }

    #[test]
    fn test_catalogs_keyed_by_id() {
        let mut state = DeviceState::default();
        apply_update(
            &mut state,
            uri::LIST_APPS,
            &json!({"apps": [{"id": "netflix", "title": "Netflix"}, {"title": "no id"}]}),
        );
        assert_eq!(state.apps.len(), 1);
        assert!(state.apps.contains_key("netflix"));
    }

    #[test]
    fn test_unchanged_update() {
        let mut state = DeviceState::default();
        assert!(apply_update(&mut state, uri::POWER_STATE, &json!({"state": "Active"})));
        assert!(!apply_update(&mut state, uri::POWER_STATE, &json!({"state": "Active"})));
        assert!(!apply_update(&mut state, "ssap://unknown", &json!({})));
    }

    #[test]
    fn test_error_response() {
        let raw = r#"{"type":"error","id":"3","error":"404 no such service","payload":{}}"#;
        let response: Response = serde_json::from_str(raw).unwrap();
        assert!(response.is_error());
        assert_eq!(response.error_text(), "404 no such service");
    }
}
