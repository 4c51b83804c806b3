use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::types::MessageBody;
use service::errors::ServiceError;
use thiserror::Error;
use tracing::error;

pub const METHOD_NOT_ALLOWED: &str = "Method Not Allowed";

/// Fixed client-facing messages for server-side failures; details only go to the log.
#[derive(Debug, Clone, Copy)]
pub struct FailureMessages {
    pub not_configured: &'static str,
    pub store: &'static str,
    pub exhausted: &'static str,
}

pub const SUBSCRIBE_FAILURES: FailureMessages = FailureMessages {
    not_configured: "Server not configured (missing GITHUB_TOKEN)",
    store: "Failed to update subscribers.",
    exhausted: "Failed to update subscribers (retry).",
};

pub const LEADERBOARD_WRITE_FAILURES: FailureMessages = FailureMessages {
    not_configured: "Server missing GITHUB_TOKEN",
    store: "Write failed",
    exhausted: "Write failed (retry)",
};

pub const LEADERBOARD_READ_FAILURES: FailureMessages = FailureMessages {
    not_configured: "Server missing GITHUB_TOKEN",
    store: "Failed to load leaderboard",
    exhausted: "Failed to load leaderboard",
};

/// `{"message": ...}` error reply.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED)
    }

    pub fn from_service(err: ServiceError, messages: &FailureMessages) -> Self {
        match err {
            ServiceError::Validation(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            e @ ServiceError::NotConfigured(_) => {
                error!(error = %e, "list endpoint called without a store");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, messages.not_configured)
            }
            ServiceError::Store(e) => {
                error!(error = %e, "store request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, messages.store)
            }
            e @ ServiceError::RetriesExhausted { .. } => {
                error!(error = %e, "write retries exhausted");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, messages.exhausted)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(MessageBody::new(self.message))).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
