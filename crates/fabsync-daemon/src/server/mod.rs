//! HTTP surface of the daemon.
//!
//! Receives webhooks, serves the derived resource state and accepts switch
//! commands. All handlers go through the shared [`Engine`].

mod error;
mod routes;
mod view;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::engine::Engine;

pub use error::ApiError;
pub use view::{HealthView, ResourceView, WebhookResponse};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// API root, used to build configuration links.
    pub api_url: String,
}

/// Build the daemon router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(routes::webhook))
        .route("/resources", get(routes::list_resources))
        .route("/resources/{id}", get(routes::get_resource))
        .route("/resources/{id}/switch-on", post(routes::switch_on))
        .route("/resources/{id}/switch-off", post(routes::switch_off))
        .route("/health", get(routes::health))
        .with_state(state)
}
