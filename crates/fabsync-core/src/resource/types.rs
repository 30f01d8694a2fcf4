//! Resource types as served by the equipment-management API.
//!
//! Deserialization structs matching the `/resources?embed=bridge` JSON.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::de;

/// Marker written into `lastUsed` by an optimistic local patch until the
/// next poll brings the server's own record.
pub const PENDING_MARKER: &str = "pending";

/// Stable external identifier of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// How a resource's on/off state is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlType {
    Machine,
    Door,
    #[default]
    #[serde(other)]
    Other,
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Machine => write!(f, "machine"),
            Self::Door => write!(f, "door"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Most recent usage record of a resource.
///
/// The API names the usage id `id` and its timestamp `createdAt`; both names
/// are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUsed {
    #[serde(default, alias = "id", deserialize_with = "de::opt_string_or_number")]
    pub usage_id: Option<String>,
    #[serde(default)]
    pub stop_type: Option<String>,
    #[serde(default, alias = "createdAt", deserialize_with = "de::opt_timestamp")]
    pub at: Option<DateTime<Utc>>,
}

impl LastUsed {
    /// A usage is running: it has an id and no stop type. Empty strings
    /// count as absent.
    pub fn in_use(&self) -> bool {
        let started = self.usage_id.as_deref().is_some_and(|id| !id.is_empty());
        let stopped = self.stop_type.as_deref().is_some_and(|s| !s.is_empty());
        started && !stopped
    }

    /// Optimistic record after a successful switch-on.
    pub fn pending_start(at: DateTime<Utc>) -> Self {
        Self {
            usage_id: Some(PENDING_MARKER.to_string()),
            stop_type: None,
            at: Some(at),
        }
    }

    /// Optimistic record after a successful switch-off.
    pub fn pending_stop(previous_at: Option<DateTime<Utc>>) -> Self {
        Self {
            usage_id: None,
            stop_type: Some(PENDING_MARKER.to_string()),
            at: previous_at,
        }
    }
}

/// Hardware bridge embedded in a resource. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeInfo {
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BridgeInfo {
    /// Reported firmware, falling back to the target firmware.
    pub fn firmware(&self) -> Option<String> {
        ["firmwareVersion", "targetFirmware"]
            .iter()
            .filter_map(|key| self.extra.get(*key))
            .find_map(|value| match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

/// The `_embedded` section requested with `embed=bridge`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Embedded {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeInfo>,
}

impl Embedded {
    fn is_empty(&self) -> bool {
        self.bridge.is_none()
    }
}

/// One tracked piece of equipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: ResourceId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub control_type: ControlType,
    /// Grace period in seconds; `null` and absent both mean none.
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub max_offline_usage: u64,
    #[serde(default)]
    pub last_used: Option<LastUsed>,
    #[serde(default, rename = "account")]
    pub account_id: Option<u64>,
    #[serde(default, rename = "_embedded", skip_serializing_if = "Embedded::is_empty")]
    pub embedded: Embedded,
}

impl Resource {
    /// An empty entry, used when a patch targets an id the table lacks.
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            name: None,
            control_type: ControlType::Other,
            max_offline_usage: 0,
            last_used: None,
            account_id: None,
            embedded: Embedded::default(),
        }
    }

    pub fn grace_period(&self) -> Duration {
        i64::try_from(self.max_offline_usage)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    /// Door with a non-zero grace period.
    pub fn has_delayed_close(&self) -> bool {
        self.control_type == ControlType::Door && self.max_offline_usage > 0
    }

    pub fn bridge(&self) -> Option<&BridgeInfo> {
        self.embedded.bridge.as_ref()
    }

    /// Only bridged resources accept switch commands.
    pub fn is_switchable(&self) -> bool {
        self.bridge().is_some()
    }

    pub fn in_use(&self) -> bool {
        self.last_used.as_ref().is_some_and(LastUsed::in_use)
    }
}
