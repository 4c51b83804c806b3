use thiserror::Error;

use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    /// The store credential is missing; reported per request, never at startup.
    #[error("not configured: missing {0}")]
    NotConfigured(&'static str),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("gave up writing {path} after {attempts} conflicting attempts")]
    RetriesExhausted { path: String, attempts: u32 },
}

impl ServiceError {
    pub fn invalid(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }
}
