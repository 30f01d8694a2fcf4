//! Shared fixtures for the daemon integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::sync::Notify;

use fabsync_core::{FakeClock, Resource, ResourceId};
use fabsync_daemon::client::{ClientError, ResourceSource, SwitchAction};
use fabsync_daemon::{Engine, EngineConfig};

/// In-memory stand-in for the remote API.
#[derive(Default)]
pub struct FakeSource {
    resources: Mutex<Vec<Resource>>,
    fail_fetch: AtomicBool,
    switch_status: Mutex<Option<u16>>,
    fetches: AtomicUsize,
    switches: Mutex<Vec<(ResourceId, SwitchAction)>>,
    held: Mutex<Option<Arc<Notify>>>,
}

impl FakeSource {
    pub fn with_resources(resources: Value) -> Arc<Self> {
        let source = Arc::new(Self::default());
        source.set_resources(resources);
        source
    }

    /// Replace what the next fetch returns, given API-shaped JSON.
    pub fn set_resources(&self, resources: Value) {
        *self.resources.lock().unwrap() = serde_json::from_value(resources).unwrap();
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Make switch commands answer with `status` instead of succeeding.
    pub fn reject_switches(&self, status: u16) {
        *self.switch_status.lock().unwrap() = Some(status);
    }

    /// Hold the next fetch after it has read the resources, until the
    /// returned handle is notified.
    pub fn hold_next_fetch(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.held.lock().unwrap() = Some(Arc::clone(&release));
        release
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn switch_calls(&self) -> Vec<(ResourceId, SwitchAction)> {
        self.switches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceSource for FakeSource {
    async fn fetch_all(&self) -> Result<Vec<Resource>, ClientError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ClientError::Api {
                status: 503,
                message: "maintenance".into(),
            });
        }
        let resources = self.resources.lock().unwrap().clone();
        let held = self.held.lock().unwrap().take();
        if let Some(release) = held {
            release.notified().await;
        }
        Ok(resources)
    }

    async fn switch(&self, id: ResourceId, action: SwitchAction) -> Result<(), ClientError> {
        self.switches.lock().unwrap().push((id, action));
        match *self.switch_status.lock().unwrap() {
            None => Ok(()),
            Some(status) => Err(ClientError::Api {
                status,
                message: "bridge offline".into(),
            }),
        }
    }
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// An engine over `source` with periodic sync off, not yet started.
pub fn engine(source: &Arc<FakeSource>, clock: &FakeClock) -> Arc<Engine> {
    engine_with(source, clock, EngineConfig::default())
}

pub fn engine_with(
    source: &Arc<FakeSource>,
    clock: &FakeClock,
    config: EngineConfig,
) -> Arc<Engine> {
    fabsync_core::tracing_init::try_init_test_tracing();
    Arc::new(Engine::new(
        Arc::clone(source) as Arc<dyn ResourceSource>,
        config,
        Arc::new(clock.clone()),
    ))
}

/// A bridged machine that is currently idle.
pub fn idle_machine(id: u64) -> Value {
    json!({
        "id": id,
        "name": format!("Machine {id}"),
        "controlType": "machine",
        "maxOfflineUsage": null,
        "account": 42,
        "lastUsed": {"id": 100 + id, "stopType": "normal", "at": "2026-03-01T11:00:00Z"},
        "_embedded": {"bridge": {"serialNumber": format!("BR-{id}"), "firmwareVersion": "2.4.1"}}
    })
}

/// A bridged door with a grace period, last opened at `at`.
pub fn door(id: u64, grace: u64, at: DateTime<Utc>) -> Value {
    json!({
        "id": id,
        "controlType": "door",
        "maxOfflineUsage": grace,
        "account": 42,
        "lastUsed": {"id": 500 + id, "stopType": "normal", "at": at.to_rfc3339()},
        "_embedded": {"bridge": {"serialNumber": format!("DR-{id}")}}
    })
}

/// A webhook body as the remote posts it.
pub fn webhook_event(resource: Value, log_created_at: Option<DateTime<Utc>>) -> Value {
    json!({
        "type": "resourceLog_updated",
        "details": {
            "resource": resource,
            "log": {
                "createdAt": log_created_at.map(|t| t.to_rfc3339()),
                "stopType": "normal"
            }
        }
    })
}
