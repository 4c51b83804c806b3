use std::future::Future;

use axum::Router;
use configs::AppConfig;
use tracing::info;

use crate::routes;
use crate::state::AppState;

/// Build the application router from configuration.
pub fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let state = AppState::from_config(cfg)?;
    Ok(routes::build_router(state))
}

/// Bind `server.host:server.port` and serve until `shutdown` resolves.
///
/// In-flight requests finish before this returns.
pub async fn serve<F>(cfg: &AppConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_app(cfg)?;
    let listener = tokio::net::TcpListener::bind((cfg.server.host.as_str(), cfg.server.port)).await?;
    let addr = listener.local_addr()?;
    info!(
        %addr,
        subscribers = %cfg.subscribers.path,
        leaderboard = %cfg.leaderboard.path,
        configured = cfg.store.is_configured(),
        "list api listening"
    );
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    info!(%addr, "list api drained");
    Ok(())
}
