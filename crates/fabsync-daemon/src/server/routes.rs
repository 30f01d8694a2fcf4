use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use fabsync_core::ResourceId;

use super::AppState;
use super::error::ApiError;
use super::view::{HealthView, ResourceView, WebhookResponse};
use crate::client::SwitchAction;
use crate::error::SyncError;
use crate::sync::Outcome;

/// `POST /webhook`
pub async fn webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let outcome = state.engine.handle_webhook_bytes(&body).await;
    let status = match outcome {
        Outcome::Accepted => StatusCode::ACCEPTED,
        Outcome::Rejected(_) => StatusCode::BAD_REQUEST,
        Outcome::NotFound(_) => StatusCode::NOT_FOUND,
    };
    debug!(outcome = outcome.label(), "Webhook handled");
    (status, Json(WebhookResponse::from(&outcome))).into_response()
}

/// `GET /resources`
pub async fn list_resources(State(state): State<AppState>) -> Json<Vec<ResourceView>> {
    let snapshot = state.engine.snapshot();
    let now = state.engine.clock().now();
    Json(
        snapshot
            .iter()
            .map(|resource| ResourceView::new(resource, now, &state.api_url))
            .collect(),
    )
}

/// `GET /resources/{id}`
pub async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ResourceView>, ApiError> {
    let id = ResourceId(id);
    let resource = state
        .engine
        .store()
        .get(id)
        .ok_or(SyncError::ResourceNotFound(id))?;
    let now = state.engine.clock().now();
    Ok(Json(ResourceView::new(&resource, now, &state.api_url)))
}

/// `POST /resources/{id}/switch-on`
pub async fn switch_on(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ResourceView>, ApiError> {
    switch(&state, ResourceId(id), SwitchAction::On).await
}

/// `POST /resources/{id}/switch-off`
pub async fn switch_off(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ResourceView>, ApiError> {
    switch(&state, ResourceId(id), SwitchAction::Off).await
}

async fn switch(
    state: &AppState,
    id: ResourceId,
    action: SwitchAction,
) -> Result<Json<ResourceView>, ApiError> {
    let updated = state.engine.switch(id, action).await?;
    let now = state.engine.clock().now();
    Ok(Json(ResourceView::new(&updated, now, &state.api_url)))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthView> {
    let snapshot = state.engine.snapshot();
    Json(HealthView::new(
        &snapshot,
        state.engine.scheduler().pending_count(),
    ))
}
