use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use service::leaderboard::{ScoreEntry, Submission};

use crate::errors::{ApiError, LEADERBOARD_READ_FAILURES, LEADERBOARD_WRITE_FAILURES};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub leaderboard: Vec<ScoreEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScoreRequest {
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub score: Option<Value>,
}

impl ScoreRequest {
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    pub fn raw_name(&self) -> String {
        match &self.name {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    /// JSON numbers or numeric strings; anything else is NaN and fails validation.
    pub fn raw_score(&self) -> f64 {
        match &self.score {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }
}

/// GET /api/tetris
pub async fn top(State(state): State<AppState>) -> Result<Json<LeaderboardResponse>, ApiError> {
    let svc = state
        .leaderboard_service()
        .map_err(|e| ApiError::from_service(e, &LEADERBOARD_READ_FAILURES))?;
    let leaderboard = svc
        .top()
        .await
        .map_err(|e| ApiError::from_service(e, &LEADERBOARD_READ_FAILURES))?;
    Ok(Json(LeaderboardResponse { message: None, leaderboard }))
}

/// POST /api/tetris
pub async fn submit(State(state): State<AppState>, body: Bytes) -> Result<Json<LeaderboardResponse>, ApiError> {
    let svc = state
        .leaderboard_service()
        .map_err(|e| ApiError::from_service(e, &LEADERBOARD_WRITE_FAILURES))?;
    let input = ScoreRequest::from_body(&body);
    let submission = Submission::parse(&input.raw_name(), input.raw_score())
        .map_err(|e| ApiError::from_service(e, &LEADERBOARD_WRITE_FAILURES))?;
    let leaderboard = svc
        .submit(submission)
        .await
        .map_err(|e| ApiError::from_service(e, &LEADERBOARD_WRITE_FAILURES))?;
    Ok(Json(LeaderboardResponse { message: Some("Saved"), leaderboard }))
}

/// Any other method on /api/tetris. A missing credential is reported before the 405.
pub async fn method_not_allowed(State(state): State<AppState>) -> ApiError {
    match state.leaderboard_service() {
        Ok(_) => ApiError::method_not_allowed(),
        Err(e) => ApiError::from_service(e, &LEADERBOARD_READ_FAILURES),
    }
}
