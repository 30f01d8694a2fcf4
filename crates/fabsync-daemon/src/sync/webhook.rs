//! Webhook ingestion.
//!
//! A webhook only says "this resource changed". The table is refreshed from
//! the API rather than patched from the event body; the body supplies the
//! resource id and, for doors, the log timestamp the grace period runs from.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use fabsync_core::resource::de;
use fabsync_core::{Clock, Resource, ResourceId};

use super::poll::PollLoop;
use super::scheduler::DeferredCheckScheduler;
use crate::store::ResourceStore;

/// Reason given for a payload without `details.resource`.
pub const MISSING_RESOURCE: &str = "missing resource";

/// Result of handling one webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The table was refreshed (or a refresh was attempted).
    Accepted,
    /// The payload was unusable; nothing happened.
    Rejected(String),
    /// The referenced resource is not in the table; nothing happened.
    NotFound(ResourceId),
}

impl Outcome {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected(_) => "rejected",
            Self::NotFound(_) => "not_found",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(default)]
    details: Option<EventDetails>,
}

#[derive(Debug, Deserialize)]
struct EventDetails {
    #[serde(default)]
    resource: Option<Resource>,
    #[serde(default)]
    log: Option<EventLog>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventLog {
    #[serde(default, deserialize_with = "de::opt_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    stop_type: Option<String>,
}

/// Turns webhook events into refreshes and deferred checks.
pub struct WebhookIngestor {
    store: Arc<ResourceStore>,
    poll: Arc<PollLoop>,
    scheduler: Arc<DeferredCheckScheduler>,
    clock: Arc<dyn Clock>,
}

impl WebhookIngestor {
    pub fn new(
        store: Arc<ResourceStore>,
        poll: Arc<PollLoop>,
        scheduler: Arc<DeferredCheckScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            poll,
            scheduler,
            clock,
        }
    }

    /// Handle a raw request body.
    pub async fn handle_bytes(&self, body: &[u8]) -> Outcome {
        match serde_json::from_slice::<Value>(body) {
            Ok(payload) => self.handle(&payload).await,
            Err(e) => {
                debug!(error = %e, "Rejecting webhook with invalid JSON");
                Outcome::Rejected(format!("invalid JSON: {e}"))
            }
        }
    }

    /// Handle one parsed event.
    ///
    /// For a known resource this awaits a full refresh; a failed refresh is
    /// logged and the event still counts as accepted. Doors with a grace
    /// period then get a deferred check at the end of the grace period,
    /// counted from `log.createdAt`, else the event's `lastUsed.at`, else now.
    #[instrument(skip_all, fields(resource_id = tracing::field::Empty))]
    pub async fn handle(&self, payload: &Value) -> Outcome {
        let (event_resource, log) = match parse_event(payload) {
            Ok(parsed) => parsed,
            Err(reason) => {
                debug!(%reason, "Rejecting webhook");
                return Outcome::Rejected(reason);
            }
        };
        let id = event_resource.id;
        let event_used_at = event_resource.last_used.as_ref().and_then(|lu| lu.at);
        tracing::Span::current().record("resource_id", tracing::field::display(id));

        if !self.store.contains(id) {
            if self.store.snapshot().populated() {
                info!("Webhook references unknown resource");
            } else {
                warn!("Webhook arrived before any successful poll; table is empty");
            }
            return Outcome::NotFound(id);
        }

        debug!(stop_type = ?log.stop_type, "Webhook received; refreshing");
        self.refresh("webhook").await;

        // Prefer the server's fresh record for classification.
        let resource = self.store.get(id).unwrap_or(event_resource);
        if resource.has_delayed_close() {
            let anchor = log
                .created_at
                .or(event_used_at)
                .unwrap_or_else(|| self.clock.now());
            self.schedule_close_check(&resource, anchor).await;
        }
        Outcome::Accepted
    }

    /// Schedule the check for `anchor + grace`, or refresh now if that is
    /// already past.
    async fn schedule_close_check(&self, resource: &Resource, anchor: DateTime<Utc>) {
        let close_at = anchor
            .checked_add_signed(resource.grace_period())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if close_at <= self.clock.now() {
            debug!(%close_at, "Grace period already over; refreshing immediately");
            self.refresh("elapsed grace period").await;
        } else {
            self.scheduler.schedule(resource.id, close_at);
        }
    }

    async fn refresh(&self, reason: &'static str) {
        if let Err(e) = self.poll.poll_once().await {
            warn!(error = %e, reason, "Refresh failed; keeping previous snapshot");
        }
    }
}

/// Pull the resource and log out of a webhook payload, or say why not.
fn parse_event(payload: &Value) -> Result<(Resource, EventLog), String> {
    let event = WebhookEvent::deserialize(payload)
        .map_err(|e| format!("invalid event: {e}"))?;
    let details = event.details.ok_or_else(|| MISSING_RESOURCE.to_string())?;
    let resource = details
        .resource
        .ok_or_else(|| MISSING_RESOURCE.to_string())?;
    Ok((resource, details.log.unwrap_or_default()))
}
