//! Full-table polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::client::ResourceSource;
use crate::error::Result;
use crate::store::Reconciler;

/// Fetches the whole resource list and hands it to the [`Reconciler`].
///
/// Used by the periodic loop, by webhook invalidation and by deferred checks
/// alike, so every path that refreshes the table goes through one fetch
/// sequence and one stale-result guard.
pub struct PollLoop {
    source: Arc<dyn ResourceSource>,
    reconciler: Arc<Reconciler>,
}

impl PollLoop {
    pub fn new(source: Arc<dyn ResourceSource>, reconciler: Arc<Reconciler>) -> Self {
        Self {
            source,
            reconciler,
        }
    }

    /// Fetch every resource and replace the table.
    ///
    /// Returns the new revision, or `None` when a newer poll had already been
    /// applied. On failure the table is left untouched.
    #[instrument(skip(self), fields(fetch_seq = tracing::field::Empty))]
    pub async fn poll_once(&self) -> Result<Option<u64>> {
        let seq = self.reconciler.begin_fetch();
        tracing::Span::current().record("fetch_seq", seq);

        let resources = self.source.fetch_all().await?;
        let count = resources.len();
        let revision = self.reconciler.apply_fetch(seq, resources);
        if let Some(revision) = revision {
            debug!(count, revision, "Poll applied");
        }
        Ok(revision)
    }

    /// Poll every `period` until `shutdown` fires.
    ///
    /// The first tick is one period out; the startup poll is done by the
    /// caller. Failures are logged and the next tick proceeds as usual. A
    /// poll in flight at shutdown is abandoned.
    pub fn spawn(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(period_secs = period.as_secs(), "Periodic sync started");
            let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        tokio::select! {
                            result = self.poll_once() => {
                                if let Err(e) = result {
                                    warn!(
                                        error = %e,
                                        "Periodic poll failed; keeping previous snapshot"
                                    );
                                }
                            }
                            _ = shutdown.changed() => break,
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            info!("Periodic sync shutting down");
        })
    }
}
