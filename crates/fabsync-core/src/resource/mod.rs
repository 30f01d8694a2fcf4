//! Equipment resources and their derived on/off state.
//!
//! [`types`] mirrors the JSON served by the equipment-management API;
//! [`state`] holds the single state-derivation rule every consumer uses.

pub mod de;
mod state;
pub mod types;

pub use state::{derive_state, grace_deadline};
pub use types::{BridgeInfo, ControlType, LastUsed, PENDING_MARKER, Resource, ResourceId};
