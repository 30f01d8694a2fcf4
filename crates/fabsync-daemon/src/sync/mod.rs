//! Keeping the resource table in step with the remote service.
//!
//! - [`PollLoop`]: full-table fetches, periodic and on demand
//! - [`WebhookIngestor`]: webhook events as invalidation signals
//! - [`DeferredCheckScheduler`]: one timer per door grace period
//! - [`CommandExecutor`]: bridge switch commands with optimistic patches

mod command;
mod poll;
mod scheduler;
mod webhook;

pub use command::CommandExecutor;
pub use poll::PollLoop;
pub use scheduler::DeferredCheckScheduler;
pub use webhook::{MISSING_RESOURCE, Outcome, WebhookIngestor};
