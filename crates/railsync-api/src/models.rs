// Wire models for the controller's HTTP, event-stream, and command-channel
// surfaces.
//
// Field names follow the controller's camelCase JSON. Payloads whose shape
// varies by event type stay as `serde_json::Value` and are decoded on demand,
// so an unexpected field never fails the whole frame.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

// ── Connection registry ─────────────────────────────────────────────

/// Track power as reported by a command station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum PowerStatus {
    On,
    Off,
    #[serde(other)]
    Unknown,
}

impl PowerStatus {
    /// Parse a free-form status string, mapping anything unrecognised to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(Self::Unknown)
    }
}

/// Controller roles a connection can hold. The server enforces at most
/// one connection per role.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Throttles,
    Accessories,
    /// A role this client does not know about.
    #[serde(other)]
    Other,
}

/// Command station identity, populated once the station answers a version request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandStation {
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub version_string: Option<String>,
    /// Hardware type. The controller sends `"-1"` when unknown.
    #[serde(default, rename = "type")]
    pub hardware_type: Option<String>,
    #[serde(default)]
    pub software_version: Option<String>,
}

impl CommandStation {
    /// One-line human summary, skipping fields the station did not report.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(m) = self.manufacturer.as_deref().filter(|s| !s.is_empty()) {
            parts.push(m.to_owned());
        }
        if let Some(m) = self.model.as_deref().filter(|s| !s.is_empty()) {
            parts.push(m.to_owned());
        }
        if let Some(v) = self.version.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("v{v}"));
        }
        if let Some(v) = self.version_string.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("({v})"));
        }
        if let Some(t) = reported(self.hardware_type.as_deref()) {
            parts.push(format!("hardware type: {t}"));
        }
        if let Some(s) = reported(self.software_version.as_deref()) {
            parts.push(format!("software version: {s}"));
        }
        parts.join(" ")
    }
}

fn reported(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && *v != "-1")
}

/// A connection to one command station, as listed by `GET /connections`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: String,
    #[serde(default)]
    pub system_type: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub command_station: Option<CommandStation>,
    #[serde(default)]
    pub power_status: Option<PowerStatus>,
    #[serde(default)]
    pub roles: BTreeSet<Role>,
}

impl ConnectionRecord {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectionsResponse {
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

/// A controller family the backend can drive (`GET /api/systems`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub connection_types: Vec<String>,
}

impl SystemDescriptor {
    /// Network-attached systems take host/port instead of a serial port.
    pub fn is_network(&self) -> bool {
        self.connection_types.iter().any(|t| t == "network")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SystemsResponse {
    #[serde(default)]
    pub systems: Vec<SystemDescriptor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PortsResponse {
    #[serde(default)]
    pub ports: Vec<String>,
}

/// `POST /api/throttles` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleOpened {
    pub id: String,
}

/// `{error: string}` body carried by rejected requests.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// How a new connection reaches its command station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Network {
        host: String,
        port: u16,
    },
    Serial {
        port_name: String,
        baud_rate: Option<u32>,
        flow_control: Option<String>,
    },
}

/// Parameters for `POST /connections/create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateConnection {
    pub id: String,
    pub system_type: String,
    pub user_name: Option<String>,
    pub system_prefix: Option<String>,
    pub target: ConnectionTarget,
}

impl CreateConnection {
    /// Query pairs in the order the controller documents them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("id", self.id.clone()), ("systemType", self.system_type.clone())];
        if let Some(name) = self.user_name.as_ref().filter(|s| !s.is_empty()) {
            pairs.push(("userName", name.clone()));
        }
        if let Some(prefix) = self.system_prefix.as_ref().filter(|s| !s.is_empty()) {
            pairs.push(("systemPrefix", prefix.clone()));
        }
        match &self.target {
            ConnectionTarget::Network { host, port } => {
                pairs.push(("host", host.clone()));
                pairs.push(("port", port.to_string()));
            }
            ConnectionTarget::Serial {
                port_name,
                baud_rate,
                flow_control,
            } => {
                pairs.push(("portName", port_name.clone()));
                if let Some(baud) = baud_rate {
                    pairs.push(("baudRate", baud.to_string()));
                }
                if let Some(flow) = flow_control.as_ref().filter(|s| !s.is_empty()) {
                    pairs.push(("flowControl", flow.clone()));
                }
            }
        }
        pairs
    }
}

// ── Event stream ────────────────────────────────────────────────────

/// Discriminator of an event-stream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    MessageReceived,
    MessageSent,
    ThrottleUpdated,
    PowerChanged,
    CommunicationError,
    ConnectionStateChanged,
    /// Greeting the controller writes when a stream opens (`{"type":"connected"}`).
    #[serde(rename = "connected")]
    #[strum(serialize = "connected")]
    StreamOpened,
    #[serde(other)]
    Unknown,
}

/// One event pushed by the controller: `{type, connectionId, payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub payload: Value,
}

impl ControllerEvent {
    /// Decode the payload into a typed shape for this event kind.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let payload = if self.payload.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            self.payload.clone()
        };
        serde_json::from_value(payload)
    }
}

/// Payload of MESSAGE_RECEIVED / MESSAGE_SENT.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrafficPayload {
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub decoded: Option<String>,
    #[serde(default)]
    pub hex: Option<String>,
}

/// Payload of THROTTLE_UPDATED.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleUpdatePayload {
    pub address: u32,
    #[serde(default)]
    pub long_address: Option<bool>,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub new_value: Value,
    #[serde(default)]
    pub description: Option<String>,
}

/// Payload of POWER_CHANGED.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PowerPayload {
    #[serde(default)]
    pub status: Option<String>,
}

/// Payload of COMMUNICATION_ERROR.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommunicationErrorPayload {
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of CONNECTION_STATE_CHANGED.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionStatePayload {
    #[serde(default)]
    pub connected: bool,
}

// ── Command channel ─────────────────────────────────────────────────

/// Method value marking an unsolicited server push.
pub const METHOD_PATCH: &str = "patch";

/// A frame received on the command channel: `{id?, type, method?, data}`.
///
/// Replies to a `get` carry no `method`; broadcasts carry `method = "patch"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl ChannelMessage {
    pub fn is_patch(&self) -> bool {
        self.method.as_deref() == Some(METHOD_PATCH)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// Throttle payload shared by `throttle` replies and patches. Every state
/// field is optional: a patch names only what changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottlePayload {
    pub address: u32,
    #[serde(default)]
    pub long_address: bool,
    /// Server-side throttle id (`"{connection}:{address}:{long}"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<bool>,
    /// Function flags keyed by the decimal function number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<BTreeMap<String, bool>>,
}

/// One `{name, state}` entry of an `accessories` patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryEntry {
    pub name: String,
    pub state: String,
}

/// `{code, message}` body of a `type = "error"` frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelErrorPayload {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn connection_record_tolerates_missing_optionals() {
        let record: ConnectionRecord =
            serde_json::from_value(json!({ "id": "A", "systemType": "x", "connected": true }))
                .unwrap();
        assert_eq!(record.id, "A");
        assert!(record.power_status.is_none());
        assert!(record.roles.is_empty());
        assert!(record.command_station.is_none());
    }

    #[test]
    fn unrecognised_power_label_is_unknown() {
        let record: ConnectionRecord = serde_json::from_value(json!({
            "id": "A",
            "powerStatus": "IDLE",
            "roles": ["throttles"]
        }))
        .unwrap();
        assert_eq!(record.power_status, Some(PowerStatus::Unknown));
        assert!(record.has_role(Role::Throttles));
        assert_eq!(PowerStatus::from_label("on"), PowerStatus::On);
        assert_eq!(PowerStatus::from_label("weird"), PowerStatus::Unknown);
    }

    #[test]
    fn command_station_summary_skips_unreported_fields() {
        let cs = CommandStation {
            manufacturer: Some("Lenz".into()),
            model: Some("LZV100".into()),
            version: Some("3.6".into()),
            version_string: None,
            hardware_type: Some("-1".into()),
            software_version: Some("36".into()),
        };
        assert_eq!(cs.summary(), "Lenz LZV100 v3.6 software version: 36");
    }

    #[test]
    fn stream_greeting_parses_without_connection_id() {
        let event: ControllerEvent = serde_json::from_str(r#"{"type":"connected"}"#).unwrap();
        assert_eq!(event.kind, EventKind::StreamOpened);
        assert!(event.connection_id.is_empty());
    }

    #[test]
    fn unknown_event_type_is_tolerated() {
        let event: ControllerEvent =
            serde_json::from_str(r#"{"type":"TURNOUT_UPDATED","connectionId":"A","payload":{}}"#)
                .unwrap();
        assert_eq!(event.kind, EventKind::Unknown);
    }

    #[test]
    fn throttle_update_payload_decodes() {
        let event: ControllerEvent = serde_json::from_value(json!({
            "type": "THROTTLE_UPDATED",
            "connectionId": "A",
            "payload": { "address": 3, "longAddress": false, "property": "SpeedSetting", "newValue": 0.25 }
        }))
        .unwrap();
        let payload: ThrottleUpdatePayload = event.decode().unwrap();
        assert_eq!(payload.address, 3);
        assert_eq!(payload.property.as_deref(), Some("SpeedSetting"));
        assert_eq!(payload.new_value.as_f64(), Some(0.25));
    }

    #[test]
    fn channel_patch_flag() {
        let msg: ChannelMessage = serde_json::from_value(json!({
            "type": "throttle",
            "method": "patch",
            "data": { "address": 3, "functions": { "2": true } }
        }))
        .unwrap();
        assert!(msg.is_patch());
        let payload: ThrottlePayload = msg.decode().unwrap();
        assert!(!payload.long_address);
        assert!(payload.speed.is_none());
        assert_eq!(payload.functions.unwrap().get("2"), Some(&true));
    }

    #[test]
    fn create_connection_query_for_serial_target() {
        let req = CreateConnection {
            id: "cs1".into(),
            system_type: "xnet-elite".into(),
            user_name: None,
            system_prefix: Some(String::new()),
            target: ConnectionTarget::Serial {
                port_name: "ttyUSB0".into(),
                baud_rate: Some(19200),
                flow_control: None,
            },
        };
        let pairs = req.query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("id", "cs1".to_string()),
                ("systemType", "xnet-elite".to_string()),
                ("portName", "ttyUSB0".to_string()),
                ("baudRate", "19200".to_string()),
            ]
        );
    }
}
