use axum::{body::Bytes, extract::State, Json};
use serde::Deserialize;
use serde_json::Value;

use common::types::MessageBody;
use service::subscribers::SubscribeOutcome;

use crate::errors::{ApiError, SUBSCRIBE_FAILURES};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: Option<Value>,
}

impl SubscribeRequest {
    /// Malformed or non-object bodies behave like `{}`.
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// Strings pass through, numbers are stringified, anything else is empty.
    pub fn raw_email(&self) -> String {
        match &self.email {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }
}

/// POST /api/subscribe
pub async fn subscribe(State(state): State<AppState>, body: Bytes) -> Result<Json<MessageBody>, ApiError> {
    let svc = state
        .subscriber_service()
        .map_err(|e| ApiError::from_service(e, &SUBSCRIBE_FAILURES))?;
    let input = SubscribeRequest::from_body(&body);
    let outcome = svc
        .subscribe(&input.raw_email())
        .await
        .map_err(|e| ApiError::from_service(e, &SUBSCRIBE_FAILURES))?;
    let message = match outcome {
        SubscribeOutcome::Subscribed => "Subscribed successfully!",
        SubscribeOutcome::AlreadySubscribed => "You're already subscribed!",
    };
    Ok(Json(MessageBody::new(message)))
}
