//! The sync engine.
//!
//! [`Engine`] owns the resource table and every component that writes to it,
//! and runs the background tasks (periodic poll, deferred-check worker).
//! Presentation layers hold an `Arc<Engine>` and read state through it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fabsync_core::config::SyncConfig;
use fabsync_core::{Clock, Resource, ResourceId, derive_state};

use crate::client::{ResourceSource, SwitchAction};
use crate::error::Result;
use crate::store::{Change, Reconciler, ResourceStore, Snapshot, SubscriptionId};
use crate::sync::{CommandExecutor, DeferredCheckScheduler, Outcome, PollLoop, WebhookIngestor};

/// Engine settings.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Periodic poll interval; `None` disables periodic sync.
    pub poll_interval: Option<Duration>,
}

impl From<&SyncConfig> for EngineConfig {
    fn from(sync: &SyncConfig) -> Self {
        Self {
            poll_interval: sync.poll_interval(),
        }
    }
}

/// Owner of the resource table and its writers.
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    reconciler: Arc<Reconciler>,
    poll: Arc<PollLoop>,
    scheduler: Arc<DeferredCheckScheduler>,
    webhook: WebhookIngestor,
    commands: CommandExecutor,
    /// Taken by [`Engine::start`].
    fired: Mutex<Option<mpsc::UnboundedReceiver<ResourceId>>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(
        source: Arc<dyn ResourceSource>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(ResourceStore::new());
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&store), Arc::clone(&clock)));
        let poll = Arc::new(PollLoop::new(Arc::clone(&source), Arc::clone(&reconciler)));
        let (scheduler, fired) = DeferredCheckScheduler::new(Arc::clone(&clock));
        let scheduler = Arc::new(scheduler);

        let webhook = WebhookIngestor::new(
            store,
            Arc::clone(&poll),
            Arc::clone(&scheduler),
            Arc::clone(&clock),
        );
        let commands = CommandExecutor::new(
            source,
            Arc::clone(&reconciler),
            Arc::clone(&scheduler),
            Arc::clone(&clock),
        );
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            clock,
            reconciler,
            poll,
            scheduler,
            webhook,
            commands,
            fired: Mutex::new(Some(fired)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Run the first poll, then start the background tasks.
    ///
    /// Returns once the first poll has finished, successfully or not; a
    /// failure is logged and the table stays unpopulated until a later poll
    /// succeeds. Calling this twice only repeats the poll.
    pub async fn start(&self) {
        match self.poll.poll_once().await {
            Ok(_) => info!(
                resources = self.store().snapshot().len(),
                "Initial sync complete"
            ),
            Err(e) => warn!(error = %e, "Initial sync failed; serving without data"),
        }

        let Some(fired) = self.fired.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            warn!("Engine already started");
            return;
        };

        let mut tasks = Vec::with_capacity(2);
        tasks.push(spawn_deferred_check_worker(
            Arc::clone(&self.poll),
            fired,
            self.shutdown_tx.subscribe(),
        ));
        if let Some(period) = self.config.poll_interval {
            tasks.push(Arc::clone(&self.poll).spawn(period, self.shutdown_tx.subscribe()));
        } else {
            info!("Periodic sync disabled");
        }
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(tasks);
    }

    /// Stop background tasks and cancel every pending check.
    ///
    /// In-flight polls are abandoned; the table keeps its last committed
    /// snapshot.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let cancelled = self.scheduler.cancel_all();
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Engine task ended abnormally");
            }
        }
        info!(cancelled, "Engine stopped");
    }

    /// Fetch every resource now.
    pub async fn refresh(&self) -> Result<Option<u64>> {
        self.poll.poll_once().await
    }

    pub async fn handle_webhook(&self, payload: &Value) -> Outcome {
        self.webhook.handle(payload).await
    }

    pub async fn handle_webhook_bytes(&self, body: &[u8]) -> Outcome {
        self.webhook.handle_bytes(body).await
    }

    pub async fn switch(&self, id: ResourceId, action: SwitchAction) -> Result<Resource> {
        self.commands.switch(id, action).await
    }

    /// Derived on/off state of one resource, `None` if unknown.
    pub fn state(&self, id: ResourceId) -> Option<bool> {
        self.store()
            .get(id)
            .map(|resource| derive_state(&resource, self.clock.now()))
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store().snapshot()
    }

    pub fn store(&self) -> &Arc<ResourceStore> {
        self.reconciler.store()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn scheduler(&self) -> &DeferredCheckScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Register a callback run after every committed write.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> SubscriptionId {
        self.reconciler.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.reconciler.unsubscribe(id)
    }

    pub fn changes(&self) -> broadcast::Receiver<Change> {
        self.reconciler.changes()
    }
}

/// Run a re-poll for each batch of fired deferred checks.
///
/// Checks that fire while a re-poll is running are folded into the next one.
fn spawn_deferred_check_worker(
    poll: Arc<PollLoop>,
    mut fired: mpsc::UnboundedReceiver<ResourceId>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                next = fired.recv() => {
                    let Some(id) = next else { break };
                    let mut batch = 1_usize;
                    while fired.try_recv().is_ok() {
                        batch += 1;
                    }
                    debug!(resource_id = %id, batch, "Running deferred check");
                    tokio::select! {
                        result = poll.poll_once() => {
                            if let Err(e) = result {
                                warn!(error = %e, "Deferred check poll failed");
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Deferred check worker stopped");
    })
}
