use std::sync::Arc;

use configs::AppConfig;
use service::leaderboard::LeaderboardService;
use service::errors::ServiceError;
use service::runtime;
use service::storage::ContentStore;
use service::subscribers::SubscriberService;

use crate::errors::StartupError;
use crate::routes::cors::CorsPolicy;

/// Shared handler state. Services are `None` until a store credential is configured.
#[derive(Clone)]
pub struct AppState {
    pub subscribers: Option<SubscriberService>,
    pub leaderboard: Option<LeaderboardService>,
    pub subscribe_cors: CorsPolicy,
    pub leaderboard_cors: CorsPolicy,
}

impl AppState {
    /// Build the store backend described by `cfg` and wire both endpoints to it.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, StartupError> {
        let store = runtime::build_content_store(cfg).map_err(|e| StartupError::InvalidConfig(e.to_string()))?;
        Self::with_store(cfg, store)
    }

    /// Same as `from_config` with an explicit store (tests inject a `MemoryContentStore`).
    pub fn with_store(cfg: &AppConfig, store: Option<Arc<dyn ContentStore>>) -> Result<Self, StartupError> {
        let (subscribers, leaderboard) = match store {
            Some(store) => {
                let (s, l) = runtime::build_services(cfg, store);
                (Some(s), Some(l))
            }
            None => (None, None),
        };
        let subscribe_cors = CorsPolicy::new(&cfg.subscribers.allowed_origin, "POST,OPTIONS")
            .map_err(|e| StartupError::InvalidConfig(format!("subscribers.allowed_origin: {e}")))?;
        let leaderboard_cors = CorsPolicy::new(&cfg.leaderboard.allowed_origin, "GET,POST,OPTIONS")
            .map_err(|e| StartupError::InvalidConfig(format!("leaderboard.allowed_origin: {e}")))?;
        Ok(Self { subscribers, leaderboard, subscribe_cors, leaderboard_cors })
    }

    pub fn subscriber_service(&self) -> Result<&SubscriberService, ServiceError> {
        self.subscribers.as_ref().ok_or(ServiceError::NotConfigured("GITHUB_TOKEN"))
    }

    pub fn leaderboard_service(&self) -> Result<&LeaderboardService, ServiceError> {
        self.leaderboard.as_ref().ok_or(ServiceError::NotConfigured("GITHUB_TOKEN"))
    }
}
