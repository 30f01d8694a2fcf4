//! Single writer of the resource table.
//!
//! Every update (poll snapshot, webhook-triggered re-poll, command patch,
//! deferred check) goes through [`Reconciler`]. Writes are serialized by a
//! write gate held only while the new snapshot is built and installed,
//! never across network I/O. Subscribers are notified after the new
//! snapshot is visible.
//!
//! A poll that was already in flight when a command patched an entry did
//! not see that command. When such a poll lands, the patched entry is laid
//! back over its result; only a poll started after the patch replaces it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use fabsync_core::{Clock, Resource, ResourceId};

use super::{ResourceStore, Snapshot};

/// Capacity of the change broadcast channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Scope of a committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// The whole table was replaced.
    All { revision: u64 },
    /// One entry was patched.
    Resource { id: ResourceId, revision: u64 },
}

impl Change {
    pub const fn revision(&self) -> u64 {
        match self {
            Self::All { revision } | Self::Resource { revision, .. } => *revision,
        }
    }
}

/// Handle returned by [`Reconciler::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn() + Send + Sync>;

/// State guarded by the write gate.
#[derive(Debug, Default)]
struct WriteState {
    /// Last fetch sequence number handed out by [`Reconciler::begin_fetch`].
    issued_fetch_seq: u64,
    /// Sequence number of the newest poll result applied so far.
    last_fetch_seq: u64,
    /// Patched entries with the newest fetch sequence issued when they were
    /// written. Polls up to that sequence started before the patch.
    patches: HashMap<ResourceId, (u64, Resource)>,
}

/// Applies updates to the [`ResourceStore`] and notifies subscribers.
pub struct Reconciler {
    store: Arc<ResourceStore>,
    clock: Arc<dyn Clock>,
    write_gate: Mutex<WriteState>,
    subscribers: RwLock<Vec<(SubscriptionId, Callback)>>,
    next_subscription: AtomicU64,
    changes: broadcast::Sender<Change>,
}

impl Reconciler {
    pub fn new(store: Arc<ResourceStore>, clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            store,
            clock,
            write_gate: Mutex::new(WriteState::default()),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            changes,
        }
    }

    pub fn store(&self) -> &Arc<ResourceStore> {
        &self.store
    }

    fn gate(&self) -> MutexGuard<'_, WriteState> {
        self.write_gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hand out the sequence number for a poll about to go to the network.
    pub fn begin_fetch(&self) -> u64 {
        let mut gate = self.gate();
        gate.issued_fetch_seq += 1;
        gate.issued_fetch_seq
    }

    /// Replace the whole table with `resources`.
    ///
    /// Later duplicates of an id win and earlier patches are dropped. Fires
    /// one [`Change::All`]. Returns the new revision.
    pub fn replace_all(&self, resources: impl IntoIterator<Item = Resource>) -> u64 {
        let table = build_table(resources);
        let revision = {
            let mut gate = self.gate();
            gate.patches.clear();
            self.install_table(table)
        };
        self.notify(Change::All { revision });
        revision
    }

    /// Replace the table with the result of poll number `fetch_seq`.
    ///
    /// Results older than one already applied are discarded so a slow fetch
    /// cannot roll the table back. Entries patched after this poll started
    /// keep their patched value, as long as the poll still returns them.
    /// Returns the new revision, or `None` when discarded.
    pub fn apply_fetch(
        &self,
        fetch_seq: u64,
        resources: impl IntoIterator<Item = Resource>,
    ) -> Option<u64> {
        let mut table = build_table(resources);
        let revision = {
            let mut gate = self.gate();
            if fetch_seq <= gate.last_fetch_seq {
                debug!(
                    fetch_seq,
                    applied = gate.last_fetch_seq,
                    "Discarding stale poll result"
                );
                return None;
            }
            gate.last_fetch_seq = fetch_seq;
            gate.patches.retain(|_, (watermark, _)| *watermark >= fetch_seq);
            for (id, (_, patched)) in &gate.patches {
                if table.contains_key(id) {
                    debug!(resource_id = %id, fetch_seq, "Keeping patch newer than poll");
                    table.insert(*id, patched.clone());
                }
            }
            self.install_table(table)
        };
        self.notify(Change::All { revision });
        Some(revision)
    }

    /// Apply `mutator` to one entry (an empty one if absent) and write it back.
    ///
    /// The id is restored after the mutator runs. Fires one
    /// [`Change::Resource`] and returns the written entry.
    pub fn patch<F>(&self, id: ResourceId, mutator: F) -> Resource
    where
        F: FnOnce(&mut Resource),
    {
        let (revision, updated) = {
            let mut gate = self.gate();
            let current = self.store.snapshot();
            let mut resource = current.get(id).cloned().unwrap_or_else(|| Resource::new(id));
            mutator(&mut resource);
            resource.id = id;
            let watermark = gate.issued_fetch_seq;
            gate.patches.insert(id, (watermark, resource.clone()));

            let revision = current.revision + 1;
            self.store.install(Snapshot {
                resources: current.resources.update(id, resource.clone()),
                revision,
                populated: current.populated,
                last_synced: current.last_synced,
            });
            (revision, resource)
        };
        self.notify(Change::Resource { id, revision });
        updated
    }

    /// Register a callback invoked after every committed write.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    /// Stream of committed writes, for async consumers.
    pub fn changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    /// Caller must hold the write gate.
    fn install_table(&self, resources: im::OrdMap<ResourceId, Resource>) -> u64 {
        let revision = self.store.snapshot().revision + 1;
        let count = resources.len();
        self.store.install(Snapshot {
            resources,
            revision,
            populated: true,
            last_synced: Some(self.clock.now()),
        });
        debug!(revision, count, "Installed resource snapshot");
        revision
    }

    fn notify(&self, change: Change) {
        let callbacks: Vec<Callback> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback();
        }
        // No receivers is fine.
        let _ = self.changes.send(change);
        trace!(?change, "Notified subscribers");
    }
}

fn build_table(resources: impl IntoIterator<Item = Resource>) -> im::OrdMap<ResourceId, Resource> {
    resources.into_iter().map(|r| (r.id, r)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use fabsync_core::{FakeClock, LastUsed};

    use super::*;

    fn reconciler() -> Reconciler {
        Reconciler::new(Arc::new(ResourceStore::new()), Arc::new(FakeClock::default()))
    }

    fn named(id: u64, name: &str) -> Resource {
        Resource {
            name: Some(name.to_string()),
            ..Resource::new(ResourceId(id))
        }
    }

    fn counter(reconciler: &Reconciler) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        reconciler.subscribe(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn replace_all_swaps_table_and_notifies_once() {
        let reconciler = reconciler();
        let count = counter(&reconciler);

        reconciler.replace_all(vec![named(1, "a"), named(2, "b")]);
        let revision = reconciler.replace_all(vec![named(3, "c")]);

        let snapshot = reconciler.store().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(ResourceId(3)));
        assert!(!snapshot.contains(ResourceId(1)));
        assert!(snapshot.populated());
        assert!(snapshot.last_synced().is_some());
        assert_eq!(snapshot.revision(), revision);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn duplicate_ids_keep_last() {
        let reconciler = reconciler();
        reconciler.replace_all(vec![named(1, "first"), named(1, "second")]);
        let snapshot = reconciler.store().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot.get(ResourceId(1)).unwrap().name.as_deref(),
            Some("second")
        );
    }

    #[test]
    fn patch_absent_id_starts_from_empty_entry() {
        let reconciler = reconciler();
        let updated = reconciler.patch(ResourceId(9), |r| r.name = Some("new".into()));
        assert_eq!(updated.id, ResourceId(9));
        assert_eq!(reconciler.store().get(ResourceId(9)), Some(updated));
        assert!(!reconciler.store().snapshot().populated());
    }

    #[test]
    fn patch_cannot_change_id() {
        let reconciler = reconciler();
        reconciler.replace_all(vec![named(1, "a")]);
        reconciler.patch(ResourceId(1), |r| r.id = ResourceId(2));
        let snapshot = reconciler.store().snapshot();
        assert!(snapshot.contains(ResourceId(1)));
        assert!(!snapshot.contains(ResourceId(2)));
    }

    #[test]
    fn noop_patch_twice_notifies_twice_without_changing_content() {
        let reconciler = reconciler();
        reconciler.replace_all(vec![named(1, "a")]);
        let before = reconciler.store().get(ResourceId(1));
        let count = counter(&reconciler);

        reconciler.patch(ResourceId(1), |_| {});
        reconciler.patch(ResourceId(1), |_| {});

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(reconciler.store().get(ResourceId(1)), before);
    }

    #[test]
    fn patch_is_scoped_in_change_stream() {
        let reconciler = reconciler();
        let mut rx = reconciler.changes();
        reconciler.replace_all(vec![named(1, "a")]);
        reconciler.patch(ResourceId(1), |r| {
            r.last_used = Some(LastUsed::pending_start(chrono::Utc::now()));
        });

        assert_eq!(rx.try_recv().unwrap(), Change::All { revision: 1 });
        assert_eq!(
            rx.try_recv().unwrap(),
            Change::Resource {
                id: ResourceId(1),
                revision: 2
            }
        );
    }

    #[test]
    fn stale_fetch_is_discarded() {
        let reconciler = reconciler();
        let count = counter(&reconciler);

        assert!(reconciler.apply_fetch(2, vec![named(1, "newer")]).is_some());
        assert!(reconciler.apply_fetch(1, vec![named(1, "older")]).is_none());

        let name = reconciler.store().get(ResourceId(1)).unwrap().name;
        assert_eq!(name.as_deref(), Some("newer"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn patch_survives_poll_started_before_it() {
        let reconciler = reconciler();
        let first = reconciler.begin_fetch();
        reconciler.apply_fetch(first, vec![named(1, "a"), named(2, "b")]);

        let in_flight = reconciler.begin_fetch();
        reconciler.patch(ResourceId(1), |r| r.name = Some("patched".into()));
        reconciler.apply_fetch(in_flight, vec![named(1, "server"), named(2, "server")]);

        let snapshot = reconciler.store().snapshot();
        let name = |id| snapshot.get(ResourceId(id)).unwrap().name.clone();
        assert_eq!(name(1).as_deref(), Some("patched"));
        assert_eq!(name(2).as_deref(), Some("server"));
    }

    #[test]
    fn poll_started_after_patch_replaces_it() {
        let reconciler = reconciler();
        reconciler.replace_all(vec![named(1, "a")]);
        reconciler.patch(ResourceId(1), |r| r.name = Some("patched".into()));

        let seq = reconciler.begin_fetch();
        reconciler.apply_fetch(seq, vec![named(1, "server")]);
        let name = reconciler.store().get(ResourceId(1)).unwrap().name;
        assert_eq!(name.as_deref(), Some("server"));

        // The patch is spent; later polls do not bring it back either.
        let seq = reconciler.begin_fetch();
        reconciler.apply_fetch(seq, vec![named(1, "again")]);
        let name = reconciler.store().get(ResourceId(1)).unwrap().name;
        assert_eq!(name.as_deref(), Some("again"));
    }

    #[test]
    fn patched_entry_missing_from_poll_is_not_resurrected() {
        let reconciler = reconciler();
        let in_flight = reconciler.begin_fetch();
        reconciler.patch(ResourceId(5), |r| r.name = Some("patched".into()));
        reconciler.apply_fetch(in_flight, vec![named(1, "a")]);

        assert!(!reconciler.store().contains(ResourceId(5)));
    }

    #[test]
    fn callback_observes_committed_write() {
        let reconciler = Arc::new(reconciler());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let store = Arc::clone(reconciler.store());
            let seen = Arc::clone(&seen);
            reconciler.subscribe(move || {
                let names: Vec<_> = store
                    .snapshot()
                    .iter()
                    .filter_map(|r| r.name.clone())
                    .collect();
                seen.lock().unwrap().push(names);
            });
        }

        reconciler.replace_all(vec![named(1, "a")]);
        reconciler.patch(ResourceId(1), |r| r.name = Some("b".into()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![vec!["a".to_string()], vec!["b".to_string()]]
        );
    }

    #[test]
    fn unsubscribe_stops_callbacks() {
        let reconciler = reconciler();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = reconciler.subscribe(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        reconciler.replace_all(vec![]);
        assert!(reconciler.unsubscribe(id));
        assert!(!reconciler.unsubscribe(id));
        reconciler.replace_all(vec![]);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn readers_never_see_mixed_snapshots() {
        let reconciler = Arc::new(reconciler());
        let table = |tag: &str| (1..=100).map(|id| named(id, tag)).collect::<Vec<_>>();
        reconciler.replace_all(table("old"));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(reconciler.store());
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let snapshot = store.snapshot();
                        let tags: std::collections::HashSet<_> =
                            snapshot.iter().filter_map(|r| r.name.clone()).collect();
                        assert_eq!(tags.len(), 1, "mixed snapshot: {tags:?}");
                        assert_eq!(snapshot.len(), 100);
                    }
                })
            })
            .collect();

        for round in 0..500 {
            let tag = if round % 2 == 0 { "new" } else { "old" };
            reconciler.replace_all(table(tag));
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
