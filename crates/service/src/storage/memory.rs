use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::content_store::{ContentStore, Revision, StoreError, StoredBlob};

#[derive(Clone)]
struct Entry {
    content: Vec<u8>,
    revision: Revision,
}

enum Interference {
    /// Another writer lands just before the next `put`.
    ConcurrentWrite { path: String, content: Vec<u8> },
    Fail(StoreError),
}

/// In-process `ContentStore` with the same CAS rules as the remote one.
///
/// Used for local runs (`STORE_BACKEND=memory`) and as a test double: it
/// counts calls and can interleave a competing writer or a failure before
/// the next write.
#[derive(Default)]
pub struct MemoryContentStore {
    files: RwLock<HashMap<String, Entry>>,
    pending: Mutex<VecDeque<Interference>>,
    next_revision: AtomicU64,
    fetches: AtomicUsize,
    puts: AtomicUsize,
}

impl MemoryContentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn bump_revision(&self) -> Revision {
        let n = self.next_revision.fetch_add(1, Ordering::SeqCst) + 1;
        Revision::new(format!("rev-{n}"))
    }

    /// Place content at `path` without any revision check.
    pub async fn seed(&self, path: &str, content: impl Into<Vec<u8>>) -> Revision {
        let revision = self.bump_revision();
        let mut files = self.files.write().await;
        files.insert(
            path.to_string(),
            Entry { content: content.into(), revision: revision.clone() },
        );
        revision
    }

    pub async fn contents(&self, path: &str) -> Option<Vec<u8>> {
        let files = self.files.read().await;
        files.get(path).map(|e| e.content.clone())
    }

    /// Stored content parsed as JSON; `None` when absent or unparseable.
    pub async fn json(&self, path: &str) -> Option<serde_json::Value> {
        self.contents(path)
            .await
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
    }

    /// Queue a competing write that is applied right before the next `put`.
    pub async fn interleave_write(&self, path: &str, content: impl Into<Vec<u8>>) {
        let mut pending = self.pending.lock().await;
        pending.push_back(Interference::ConcurrentWrite {
            path: path.to_string(),
            content: content.into(),
        });
    }

    /// Make the next `put` fail with `err` without touching stored data.
    pub async fn fail_next_put(&self, err: StoreError) {
        let mut pending = self.pending.lock().await;
        pending.push_back(Interference::Fail(err));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn fetch(&self, path: &str) -> Result<Option<StoredBlob>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let files = self.files.read().await;
        Ok(files.get(path).map(|e| StoredBlob {
            content: e.content.clone(),
            revision: e.revision.clone(),
        }))
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        _message: &str,
        expected: Option<&Revision>,
    ) -> Result<Revision, StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);

        let interference = self.pending.lock().await.pop_front();
        match interference {
            Some(Interference::Fail(err)) => return Err(err),
            Some(Interference::ConcurrentWrite { path: other, content }) => {
                self.seed(&other, content).await;
            }
            None => {}
        }

        let mut files = self.files.write().await;
        let current = files.get(path).map(|e| &e.revision);
        let accepted = match (current, expected) {
            (None, None) => true,
            (Some(cur), Some(exp)) => cur == exp,
            _ => false,
        };
        if !accepted {
            return Err(StoreError::Conflict { path: path.to_string() });
        }
        let revision = self.bump_revision();
        files.insert(
            path.to_string(),
            Entry { content: content.to_vec(), revision: revision.clone() },
        );
        Ok(revision)
    }
}
