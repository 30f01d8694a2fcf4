//! Deferred re-checks for door grace periods.
//!
//! One pending check per resource id. Scheduling an id again replaces its
//! check; the replaced timer is aborted and, should it already be past its
//! sleep, its sequence number no longer matches so it neither fires nor
//! removes its successor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use fabsync_core::{Clock, ResourceId};

/// An outstanding timer for one resource.
#[derive(Debug)]
struct PendingCheck {
    seq: u64,
    fire_at: DateTime<Utc>,
    handle: AbortHandle,
}

type PendingMap = HashMap<ResourceId, PendingCheck>;

/// Registry of pending deferred checks.
///
/// Timers report on the channel returned by [`DeferredCheckScheduler::new`];
/// whoever owns the receiver runs the re-poll.
pub struct DeferredCheckScheduler {
    pending: Arc<Mutex<PendingMap>>,
    next_seq: AtomicU64,
    fired: mpsc::UnboundedSender<ResourceId>,
    clock: Arc<dyn Clock>,
}

impl DeferredCheckScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<ResourceId>) {
        let (fired, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(1),
            fired,
            clock,
        };
        (scheduler, rx)
    }

    fn lock(&self) -> MutexGuard<'_, PendingMap> {
        lock_pending(&self.pending)
    }

    /// Fire a check for `id` at `fire_at`, replacing any pending one.
    ///
    /// A `fire_at` already in the past fires on the next runtime turn. Must be
    /// called from within a Tokio runtime.
    pub fn schedule(&self, id: ResourceId, fire_at: DateTime<Utc>) {
        let delay = (fire_at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let pending = Arc::clone(&self.pending);
        let fired = self.fired.clone();

        // Held across the spawn so the new timer cannot look itself up before
        // it is registered.
        let mut map = self.lock();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut map = lock_pending(&pending);
            if map.get(&id).is_some_and(|check| check.seq == seq) {
                map.remove(&id);
                drop(map);
                trace!(resource_id = %id, "Deferred check fired");
                // Receiver gone means the engine is shutting down.
                let _ = fired.send(id);
            }
        });
        let replaced = map.insert(
            id,
            PendingCheck {
                seq,
                fire_at,
                handle: task.abort_handle(),
            },
        );
        drop(map);

        if let Some(old) = replaced {
            old.handle.abort();
            debug!(
                resource_id = %id,
                old_fire_at = %old.fire_at,
                %fire_at,
                "Rescheduled deferred check"
            );
        } else {
            debug!(
                resource_id = %id,
                %fire_at,
                delay_secs = delay.as_secs(),
                "Scheduled deferred check"
            );
        }
    }

    /// Cancel the pending check for `id`. Returns whether one existed.
    pub fn cancel(&self, id: ResourceId) -> bool {
        let Some(check) = self.lock().remove(&id) else {
            return false;
        };
        check.handle.abort();
        debug!(resource_id = %id, "Cancelled deferred check");
        true
    }

    /// Cancel every pending check.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PendingCheck> = self.lock().drain().map(|(_, check)| check).collect();
        for check in &drained {
            check.handle.abort();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "Cancelled all deferred checks");
        }
        drained.len()
    }

    pub fn pending_fire_at(&self, id: ResourceId) -> Option<DateTime<Utc>> {
        self.lock().get(&id).map(|check| check.fire_at)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }
}

impl Drop for DeferredCheckScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn lock_pending(pending: &Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}
