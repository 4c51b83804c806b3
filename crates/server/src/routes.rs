use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use common::types::Health;
use service::observability;

use crate::errors::ApiError;
use crate::state::AppState;

pub mod cors;
pub mod leaderboard;
pub mod subscribe;

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn metrics() -> impl IntoResponse {
    match observability::encode_metrics() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("metrics encode error: {e}")),
    }
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

/// Build the full application router: list endpoints plus health and metrics.
pub fn build_router(state: AppState) -> Router {
    let subscribe_route = post(subscribe::subscribe)
        .fallback(method_not_allowed)
        .layer(middleware::from_fn_with_state(state.subscribe_cors.clone(), cors::apply_cors));

    let tetris_route = get(leaderboard::top)
        .post(leaderboard::submit)
        .fallback(leaderboard::method_not_allowed)
        .layer(middleware::from_fn_with_state(state.leaderboard_cors.clone(), cors::apply_cors));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/subscribe", subscribe_route)
        .route("/api/tetris", tetris_route)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                // 每次请求创建 span，包含方法和路径等，日志级别为 INFO
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                // 响应返回时打点，包含状态码与耗时
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                // 失败（5xx 等）时以 ERROR 记录
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
