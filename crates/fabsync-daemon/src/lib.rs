//! fabsync Daemon Library
//!
//! Keeps a local mirror of equipment state from the equipment-management
//! API and serves it:
//! - API client with `Link` pagination and bridge switch commands
//! - Snapshot store with a single serialized writer
//! - Periodic polling, webhook invalidation and door grace-period checks
//! - axum HTTP surface for webhooks, state queries and commands

pub mod client;
pub mod engine;
pub mod error;
pub mod server;
pub mod store;
pub mod sync;

pub use engine::{Engine, EngineConfig};
pub use error::SyncError;
