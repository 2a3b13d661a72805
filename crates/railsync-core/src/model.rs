// ── Domain model for the mirrored panel state ──
//
// Everything the store holds besides the wire `ConnectionRecord`, which is
// re-exported unchanged.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;
use strum::{Display, EnumString};

pub use railsync_api::models::{
    CommandStation, ConnectionRecord, PowerStatus, Role, SystemDescriptor,
};

// ── Logs ─────────────────────────────────────────────────────────────

/// Console class of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogCategory {
    /// Traffic from a command station, or a frame read from the channel.
    In,
    /// Traffic to a command station, or a frame written to the channel.
    Out,
    /// Power, throttle, and connection-state notices.
    Power,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub category: LogCategory,
    pub text: String,
}

impl LogEntry {
    pub fn new(category: LogCategory, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            category,
            text: text.into(),
        }
    }
}

// ── Status lines ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StatusKind {
    Success,
    Error,
}

/// The single user-visible status message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
    pub at: DateTime<Local>,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Success,
            text: text.into(),
            at: Local::now(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            text: text.into(),
            at: Local::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == StatusKind::Error
    }
}

/// A timestamped one-line status (throttle or accessory panel).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusLine {
    pub text: String,
    pub at: DateTime<Local>,
}

impl StatusLine {
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            at: Local::now(),
        }
    }
}

// ── Throttles ────────────────────────────────────────────────────────

/// Identity of a throttle: DCC address plus short/long addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ThrottleKey {
    pub address: u32,
    pub long_address: bool,
}

impl ThrottleKey {
    pub fn new(address: u32, long_address: bool) -> Self {
        Self {
            address,
            long_address,
        }
    }
}

impl fmt::Display for ThrottleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.long_address {
            write!(f, "{} (long)", self.address)
        } else {
            write!(f, "{}", self.address)
        }
    }
}

/// Speed, direction, and function flags of the focused throttle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrottleState {
    speed: f64,
    pub forward: bool,
    pub functions: BTreeMap<u32, bool>,
}

impl Default for ThrottleState {
    fn default() -> Self {
        Self {
            speed: 0.0,
            forward: true,
            functions: BTreeMap::new(),
        }
    }
}

impl ThrottleState {
    /// Normalised speed in `[0.0, 1.0]`.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Whole-percent speed for display.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
    pub fn speed_percent(&self) -> u8 {
        (self.speed * 100.0).round() as u8
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = clamp_speed(speed);
    }

    pub fn function(&self, number: u32) -> bool {
        self.functions.get(&number).copied().unwrap_or(false)
    }

    /// Apply a field-level patch; fields the patch leaves unset are kept.
    pub fn apply(&mut self, patch: &ThrottlePatch) {
        if let Some(speed) = patch.speed {
            self.set_speed(speed);
        }
        if let Some(forward) = patch.forward {
            self.forward = forward;
        }
        for (number, on) in &patch.functions {
            self.functions.insert(*number, *on);
        }
    }
}

/// Clamp to `[0.0, 1.0]`; NaN counts as stopped.
pub fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() {
        0.0
    } else {
        speed.clamp(0.0, 1.0)
    }
}

/// A partial throttle update. Only the set fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThrottlePatch {
    pub speed: Option<f64>,
    pub forward: Option<bool>,
    pub functions: BTreeMap<u32, bool>,
}

impl ThrottlePatch {
    pub fn speed(speed: f64) -> Self {
        Self {
            speed: Some(speed),
            ..Self::default()
        }
    }

    pub fn forward(forward: bool) -> Self {
        Self {
            forward: Some(forward),
            ..Self::default()
        }
    }

    pub fn function(number: u32, on: bool) -> Self {
        Self {
            functions: BTreeMap::from([(number, on)]),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.speed.is_none() && self.forward.is_none() && self.functions.is_empty()
    }
}

/// The one throttle the panel is showing and controlling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocusedThrottle {
    pub key: ThrottleKey,
    /// Server throttle id returned by `POST /api/throttles`.
    pub throttle_id: Option<String>,
    /// Owning connection, the throttle id's prefix before the first `:`.
    pub connection_id: Option<String>,
    pub state: ThrottleState,
}

impl FocusedThrottle {
    /// Focus a throttle with a fresh default state.
    pub fn new(key: ThrottleKey, throttle_id: Option<String>) -> Self {
        let connection_id = throttle_id.as_deref().and_then(connection_of);
        Self {
            key,
            throttle_id,
            connection_id,
            state: ThrottleState::default(),
        }
    }

    /// Adopt a server id learned after focusing.
    pub fn set_throttle_id(&mut self, throttle_id: String) {
        self.connection_id = connection_of(&throttle_id);
        self.throttle_id = Some(throttle_id);
    }
}

/// Connection id prefix of a server throttle id (`"cs1:3:false"` → `"cs1"`).
pub fn connection_of(throttle_id: &str) -> Option<String> {
    throttle_id
        .split_once(':')
        .map(|(conn, _)| conn)
        .filter(|conn| !conn.is_empty())
        .map(str::to_owned)
}

// ── Accessories ──────────────────────────────────────────────────────

/// Accessories are named (signals, routes) or addressed (turnouts).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AccessoryId {
    Name(String),
    Address(u32),
}

impl AccessoryId {
    /// Collection key; names and addresses never collide.
    pub(crate) fn key(&self) -> String {
        match self {
            Self::Name(name) => format!("name:{name}"),
            Self::Address(address) => format!("address:{address}"),
        }
    }
}

impl fmt::Display for AccessoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Address(address) => write!(f, "#{address}"),
        }
    }
}

/// Latest known state of one accessory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessoryStatus {
    pub id: AccessoryId,
    /// Short label: `closed`/`thrown`, or a signal aspect.
    pub state: String,
    pub updated_at: DateTime<Local>,
}

impl AccessoryStatus {
    pub fn new(id: AccessoryId, state: impl Into<String>) -> Self {
        Self {
            id,
            state: state.into(),
            updated_at: Local::now(),
        }
    }
}

/// Turnout state label.
pub fn turnout_label(closed: bool) -> &'static str {
    if closed { "closed" } else { "thrown" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_is_always_clamped() {
        let mut state = ThrottleState::default();
        state.set_speed(1.7);
        assert!((state.speed() - 1.0).abs() < f64::EPSILON);
        state.set_speed(-0.2);
        assert!(state.speed().abs() < f64::EPSILON);
        state.set_speed(f64::NAN);
        assert!(state.speed().abs() < f64::EPSILON);
        state.set_speed(0.254);
        assert_eq!(state.speed_percent(), 25);
    }

    #[test]
    fn patch_leaves_unset_fields_alone() {
        let mut state = ThrottleState::default();
        state.set_speed(0.4);
        state.functions.insert(0, true);

        state.apply(&ThrottlePatch::function(2, true));

        assert!((state.speed() - 0.4).abs() < f64::EPSILON);
        assert!(state.forward);
        assert!(state.function(0));
        assert!(state.function(2));
        assert!(!state.function(28));
    }

    #[test]
    fn connection_prefix_of_throttle_id() {
        assert_eq!(connection_of("cs1:3:false").as_deref(), Some("cs1"));
        assert_eq!(connection_of("noprefix"), None);
        assert_eq!(connection_of(":3"), None);

        let focused = FocusedThrottle::new(ThrottleKey::new(3, false), Some("z21:3".into()));
        assert_eq!(focused.connection_id.as_deref(), Some("z21"));
    }

    #[test]
    fn accessory_keys_do_not_collide() {
        assert_ne!(
            AccessoryId::Name("12".into()).key(),
            AccessoryId::Address(12).key()
        );
        assert_eq!(AccessoryId::Address(12).to_string(), "#12");
    }
}
