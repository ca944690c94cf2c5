//! Error types for the keeper's HTTP surface

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use launchpad_types::LaunchpadError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Invalid signature: {0}")]
    Unauthorized(String),

    #[error("Invalid payload: {0}")]
    BadPayload(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Event queue unavailable")]
    Unavailable,

    #[error("Failed to apply notification: {0}")]
    Reconcile(LaunchpadError),

    #[error(transparent)]
    Launchpad(#[from] LaunchpadError),
}

impl KeeperError {
    pub fn status(&self) -> StatusCode {
        match self {
            KeeperError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            KeeperError::BadPayload(_) => StatusCode::BAD_REQUEST,
            KeeperError::NotFound(_) => StatusCode::NOT_FOUND,
            KeeperError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            KeeperError::Reconcile(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            KeeperError::Reconcile(_) => StatusCode::INTERNAL_SERVER_ERROR,
            KeeperError::Launchpad(e) => match e {
                LaunchpadError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
                LaunchpadError::InvalidParameter { .. } | LaunchpadError::Serialization { .. } => StatusCode::BAD_REQUEST,
                LaunchpadError::NotFound { .. } => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<serde_json::Error> for KeeperError {
    fn from(err: serde_json::Error) -> Self {
        KeeperError::BadPayload(err.to_string())
    }
}

impl IntoResponse for KeeperError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
