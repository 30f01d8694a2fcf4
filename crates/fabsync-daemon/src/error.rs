//! Errors raised by the sync engine.

use thiserror::Error;

use fabsync_core::ResourceId;

use crate::client::{ClientError, SwitchAction};

#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or HTTP failure while fetching.
    #[error("transport error: {0}")]
    Transport(#[from] ClientError),

    /// Webhook body missing required fields.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("resource {0} not found")]
    ResourceNotFound(ResourceId),

    /// The remote rejected a switch command, or it never reached the remote.
    #[error("switch-{action} for resource {resource_id} failed: {message}")]
    CommandFailure {
        resource_id: ResourceId,
        action: SwitchAction,
        /// HTTP status, when the remote answered.
        status: Option<u16>,
        message: String,
    },

    #[error("resource {0} has no bridge and cannot be switched")]
    NotSwitchable(ResourceId),
}

impl SyncError {
    pub(crate) fn command_failure(id: ResourceId, action: SwitchAction, err: ClientError) -> Self {
        let status = match &err {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        };
        let message = match err {
            ClientError::Api { message, .. } => message,
            other => other.to_string(),
        };
        Self::CommandFailure {
            resource_id: id,
            action,
            status,
            message,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
