//! Runtime environment helpers
//!
//! Turns configuration into the store backend and the two list services so
//! binaries and tests wire things up the same way.

use std::sync::Arc;

use configs::{AppConfig, StoreBackend};
use tracing::{info, warn};

use crate::errors::ServiceError;
use crate::leaderboard::LeaderboardService;
use crate::retry::RetryPolicy;
use crate::storage::{ContentStore, GithubContentStore, ListStore, MemoryContentStore};
use crate::subscribers::SubscriberService;

/// Store backend from config; `None` when the GitHub token is missing.
pub fn build_content_store(cfg: &AppConfig) -> Result<Option<Arc<dyn ContentStore>>, ServiceError> {
    match cfg.store.backend {
        StoreBackend::Memory => {
            warn!("using in-memory store; lists are lost on restart");
            let store: Arc<dyn ContentStore> = MemoryContentStore::new();
            Ok(Some(store))
        }
        StoreBackend::Github if cfg.store.token.is_none() => {
            warn!("GITHUB_TOKEN missing; list endpoints will answer 500 until configured");
            Ok(None)
        }
        StoreBackend::Github => {
            let store: Arc<dyn ContentStore> = Arc::new(GithubContentStore::from_config(&cfg.store)?);
            info!(owner = %cfg.store.owner, repo = %cfg.store.repo, branch = %cfg.store.branch, "using GitHub contents store");
            Ok(Some(store))
        }
    }
}

/// Both list services over a shared store.
pub fn build_services(cfg: &AppConfig, store: Arc<dyn ContentStore>) -> (SubscriberService, LeaderboardService) {
    let retry = RetryPolicy::from_config(&cfg.retry);
    let subscribers = ListStore::new(store.clone(), &cfg.subscribers.path, &cfg.subscribers.commit_message)
        .with_legacy_key("subscribers")
        .with_retry(retry.clone());
    let leaderboard = ListStore::new(store, &cfg.leaderboard.path, &cfg.leaderboard.commit_message)
        .with_retry(retry);
    (
        SubscriberService::new(subscribers),
        LeaderboardService::new(leaderboard).with_limits(cfg.leaderboard.max_entries, cfg.leaderboard.top_n),
    )
}
