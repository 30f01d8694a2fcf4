//! Bridge switch commands.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use fabsync_core::{Clock, LastUsed, Resource, ResourceId};

use super::scheduler::DeferredCheckScheduler;
use crate::client::{ResourceSource, SwitchAction};
use crate::error::{Result, SyncError};
use crate::store::Reconciler;

/// Sends switch commands and applies the expected result locally.
///
/// After the remote accepts a command the entry is patched with a pending
/// usage record so readers see the new state before the next poll confirms
/// it. Nothing is patched when the command fails.
pub struct CommandExecutor {
    source: Arc<dyn ResourceSource>,
    reconciler: Arc<Reconciler>,
    scheduler: Arc<DeferredCheckScheduler>,
    clock: Arc<dyn Clock>,
}

impl CommandExecutor {
    pub fn new(
        source: Arc<dyn ResourceSource>,
        reconciler: Arc<Reconciler>,
        scheduler: Arc<DeferredCheckScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            reconciler,
            scheduler,
            clock,
        }
    }

    /// Switch a resource on or off and return the patched entry.
    #[instrument(skip(self), fields(resource_id = %id, action = %action))]
    pub async fn switch(&self, id: ResourceId, action: SwitchAction) -> Result<Resource> {
        let current = self
            .reconciler
            .store()
            .get(id)
            .ok_or(SyncError::ResourceNotFound(id))?;
        if !current.is_switchable() {
            return Err(SyncError::NotSwitchable(id));
        }

        if let Err(e) = self.source.switch(id, action).await {
            let err = SyncError::command_failure(id, action, e);
            warn!(error = %err, "Switch command failed");
            return Err(err);
        }

        let now = self.clock.now();
        let updated = self.reconciler.patch(id, |resource| {
            resource.last_used = Some(expected_usage(action, resource, now));
        });
        info!("Switch command accepted");

        if action == SwitchAction::On && updated.has_delayed_close() {
            let close_at = now
                .checked_add_signed(updated.grace_period())
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.scheduler.schedule(id, close_at);
        }
        Ok(updated)
    }
}

fn expected_usage(action: SwitchAction, resource: &Resource, now: DateTime<Utc>) -> LastUsed {
    match action {
        SwitchAction::On => LastUsed::pending_start(now),
        SwitchAction::Off => {
            LastUsed::pending_stop(resource.last_used.as_ref().and_then(|lu| lu.at))
        }
    }
}
