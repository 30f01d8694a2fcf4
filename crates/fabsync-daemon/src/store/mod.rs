//! Authoritative in-memory resource table.
//!
//! The table is an immutable [`Snapshot`] behind an `Arc`. Readers clone the
//! `Arc` and keep a consistent view for as long as they hold it; the
//! [`Reconciler`] is the only writer and swaps in whole new snapshots.

mod reconciler;

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use fabsync_core::{Resource, ResourceId};

pub use reconciler::{Change, Reconciler, SubscriptionId};

/// Immutable view of the resource table at one revision.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    resources: im::OrdMap<ResourceId, Resource>,
    revision: u64,
    populated: bool,
    last_synced: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources.contains_key(&id)
    }

    /// Resources ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Number of committed writes since startup.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether a full poll has been applied at least once.
    pub const fn populated(&self) -> bool {
        self.populated
    }

    /// Wall time of the last full snapshot replacement.
    pub const fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.last_synced
    }
}

/// Holder of the current snapshot.
///
/// Reads take the lock only long enough to clone an `Arc`; writers build the
/// next snapshot before taking it.
#[derive(Debug, Default)]
pub struct ResourceStore {
    current: RwLock<Arc<Snapshot>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last fully-committed snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Current state of one resource.
    pub fn get(&self, id: ResourceId) -> Option<Resource> {
        self.snapshot().get(id).cloned()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.snapshot().contains(id)
    }

    /// Swap in `next`. Only the reconciler calls this, under its write gate.
    fn install(&self, next: Snapshot) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
    }
}
