//! `fabsync` Core Library
//!
//! Shared functionality for `fabsync` components:
//! - Resource model as served by the equipment-management API
//! - State derivation (machine usage, door grace period)
//! - Clock abstraction for testable time handling
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod clock;
pub mod config;
pub mod error;
pub mod links;
pub mod resource;
pub mod tracing_init;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use resource::{BridgeInfo, ControlType, LastUsed, Resource, ResourceId, derive_state};
