//! Equipment-management API integration.
//!
//! Provides a reqwest-based client for the resources endpoint (with
//! `Link`-header pagination) and the bridge switch commands, behind the
//! [`ResourceSource`] trait so the engine can run against fakes.

mod api;
mod link;


use async_trait::async_trait;
use fabsync_core::{Resource, ResourceId};

pub use api::{ClientConfig, ClientError, FabmanClient};
pub use link::next_link;

/// Bridge switch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchAction {
    On,
    Off,
}

impl SwitchAction {
    /// Path segment of the bridge endpoint.
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::On => "switch-on",
            Self::Off => "switch-off",
        }
    }
}

impl std::fmt::Display for SwitchAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// Where resource state comes from and where commands go.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Fetch every resource, following pagination, in server order.
    ///
    /// Fails without partial results if any page fails.
    async fn fetch_all(&self) -> Result<Vec<Resource>, ClientError>;

    /// Send a bridge switch command for one resource.
    async fn switch(&self, id: ResourceId, action: SwitchAction) -> Result<(), ClientError>;
}
