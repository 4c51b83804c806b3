//! Service layer for the list endpoints.
//! - `storage`: content-store abstraction, GitHub and in-memory backends, `ListStore`.
//! - `subscribers` / `leaderboard`: the two list policies on top of `ListStore`.
//! - `retry`, `observability`: conflict retry policy and prometheus counters.

pub mod errors;
pub mod leaderboard;
pub mod observability;
pub mod retry;
pub mod storage;
pub mod subscribers;
pub mod runtime;

pub use errors::ServiceError;
