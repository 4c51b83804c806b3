//! Storage abstractions for service layer
//!
//! A remote blob store with compare-and-swap writes (`ContentStore`), its
//! GitHub and in-memory implementations, and `ListStore`, which keeps one
//! JSON array per file and runs the read-modify-write cycle on top.

pub mod content_store;
pub mod github;
pub mod list_store;
pub mod memory;

pub use content_store::{ContentStore, Revision, StoreError, StoredBlob};
pub use github::GithubContentStore;
pub use list_store::{ListStore, Mutation, Snapshot};
pub use memory::MemoryContentStore;
