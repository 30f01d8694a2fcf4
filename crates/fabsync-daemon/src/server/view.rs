//! JSON shapes served by the daemon.

use chrono::{DateTime, Utc};
use serde::Serialize;

use fabsync_core::links::configuration_url;
use fabsync_core::resource::grace_deadline;
use fabsync_core::{BridgeInfo, ControlType, LastUsed, Resource, ResourceId, derive_state};

use crate::store::Snapshot;
use crate::sync::Outcome;

/// A resource with its derived state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceView {
    pub id: ResourceId,
    pub name: Option<String>,
    pub control_type: ControlType,
    pub on: bool,
    pub max_offline_usage: u64,
    pub last_used: Option<LastUsed>,
    /// End of the door grace period, for doors that have one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closes_at: Option<DateTime<Utc>>,
    pub switchable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_url: Option<String>,
}

impl ResourceView {
    pub fn new(resource: &Resource, now: DateTime<Utc>, api_url: &str) -> Self {
        let bridge = resource.bridge().cloned();
        Self {
            id: resource.id,
            name: resource.name.clone(),
            control_type: resource.control_type,
            on: derive_state(resource, now),
            max_offline_usage: resource.max_offline_usage,
            last_used: resource.last_used.clone(),
            closes_at: grace_deadline(resource),
            switchable: resource.is_switchable(),
            firmware: bridge.as_ref().and_then(BridgeInfo::firmware),
            bridge,
            configuration_url: configuration_url(api_url, resource),
        }
    }
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthView {
    pub status: &'static str,
    pub populated: bool,
    pub revision: u64,
    pub last_synced: Option<DateTime<Utc>>,
    pub resources: usize,
    pub pending_checks: usize,
}

impl HealthView {
    pub fn new(snapshot: &Snapshot, pending_checks: usize) -> Self {
        Self {
            status: if snapshot.populated() { "ok" } else { "starting" },
            populated: snapshot.populated(),
            revision: snapshot.revision(),
            last_synced: snapshot.last_synced(),
            resources: snapshot.len(),
            pending_checks,
        }
    }
}

/// `POST /webhook` body.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&Outcome> for WebhookResponse {
    fn from(outcome: &Outcome) -> Self {
        let reason = match outcome {
            Outcome::Accepted => None,
            Outcome::Rejected(reason) => Some(reason.clone()),
            Outcome::NotFound(id) => Some(format!("resource {id} not found")),
        };
        Self {
            outcome: outcome.label(),
            reason,
        }
    }
}
