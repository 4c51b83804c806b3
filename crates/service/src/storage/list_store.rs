use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::errors::ServiceError;
use crate::observability::{
    RETRIES_EXHAUSTED_TOTAL, STORE_WRITES_TOTAL, TOLERANT_READS_TOTAL, WRITE_CONFLICTS_TOTAL,
};
use crate::retry::RetryPolicy;

use super::content_store::{ContentStore, Revision, StoreError};

/// Current list items and the revision they were read at.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub items: Vec<Value>,
    pub revision: Option<Revision>,
}

/// What a transform wants done with the list it was given.
pub enum Mutation<T, R> {
    /// Leave the stored list alone and answer with `R`.
    Keep(R),
    /// Write `items` back and answer with `outcome` once the write lands.
    Replace { items: Vec<T>, outcome: R },
}

/// One JSON array stored as a single file in a `ContentStore`.
///
/// Reads are tolerant: a missing file is an empty list, and so is content
/// that is not a JSON array (logged and counted). Writes are guarded by the
/// revision observed on read.
#[derive(Clone)]
pub struct ListStore {
    store: Arc<dyn ContentStore>,
    path: String,
    commit_message: String,
    legacy_key: Option<String>,
    retry: RetryPolicy,
}

impl ListStore {
    pub fn new(
        store: Arc<dyn ContentStore>,
        path: impl Into<String>,
        commit_message: impl Into<String>,
    ) -> Self {
        Self {
            store,
            path: path.into(),
            commit_message: commit_message.into(),
            legacy_key: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Also accept `{ "<key>": [...] }` and unwrap it on read.
    pub fn with_legacy_key(mut self, key: impl Into<String>) -> Self {
        self.legacy_key = Some(key.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn decode_items(&self, content: &[u8]) -> Result<Vec<Value>, String> {
        let parsed: Value = serde_json::from_slice(content).map_err(|e| e.to_string())?;
        match parsed {
            Value::Array(items) => Ok(items),
            Value::Object(mut map) => {
                let legacy = self.legacy_key.as_deref().and_then(|key| map.remove(key));
                match legacy {
                    Some(Value::Array(items)) => Ok(items),
                    _ => Err("expected a JSON array".to_string()),
                }
            }
            _ => Err("expected a JSON array".to_string()),
        }
    }

    pub async fn read(&self) -> Result<Snapshot, ServiceError> {
        let blob = match self.store.fetch(&self.path).await? {
            Some(blob) => blob,
            None => return Ok(Snapshot::default()),
        };
        let items = match self.decode_items(&blob.content) {
            Ok(items) => items,
            Err(reason) => {
                TOLERANT_READS_TOTAL.with_label_values(&[&self.path]).inc();
                warn!(
                    path = %self.path,
                    revision = %blob.revision,
                    %reason,
                    "stored list is unreadable; treating it as empty"
                );
                Vec::new()
            }
        };
        // revision 必须保留，否则无法覆盖损坏的文件
        Ok(Snapshot { items, revision: Some(blob.revision) })
    }

    /// Serialize `items` as pretty JSON and write them guarded by `expected`.
    pub async fn write<T: Serialize>(
        &self,
        items: &[T],
        expected: Option<&Revision>,
    ) -> Result<Revision, StoreError> {
        let body = serde_json::to_vec_pretty(items).map_err(|e| StoreError::Encode(e.to_string()))?;
        let revision = self
            .store
            .put(&self.path, &body, &self.commit_message, expected)
            .await?;
        STORE_WRITES_TOTAL.with_label_values(&[&self.path]).inc();
        Ok(revision)
    }

    /// Read, transform, write; on a revision conflict re-read and re-apply.
    ///
    /// `apply` is called once per attempt with the freshly read items, so it
    /// must rebuild its result from the original input every time.
    pub async fn modify<T, R, F>(&self, mut apply: F) -> Result<R, ServiceError>
    where
        T: Serialize,
        F: FnMut(Vec<Value>) -> Mutation<T, R>,
    {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let snapshot = self.read().await?;
            let (items, outcome) = match apply(snapshot.items) {
                Mutation::Keep(outcome) => return Ok(outcome),
                Mutation::Replace { items, outcome } => (items, outcome),
            };

            match self.write(&items, snapshot.revision.as_ref()).await {
                Ok(revision) => {
                    if attempt > 1 {
                        info!(path = %self.path, attempt, %revision, "list write succeeded after conflict");
                    }
                    return Ok(outcome);
                }
                Err(err) if err.is_conflict() => {
                    WRITE_CONFLICTS_TOTAL.with_label_values(&[&self.path]).inc();
                    if self.retry.should_retry(attempt, &err) {
                        warn!(path = %self.path, attempt, "revision conflict; re-reading list");
                        self.retry.wait_before_retry(attempt).await;
                        continue;
                    }
                    RETRIES_EXHAUSTED_TOTAL.with_label_values(&[&self.path]).inc();
                    error!(path = %self.path, attempts = attempt, max_attempts, "list write still conflicting; giving up");
                    return Err(ServiceError::RetriesExhausted { path: self.path.clone(), attempts: attempt });
                }
                Err(err) => {
                    error!(path = %self.path, attempt, error = %err, "list write failed");
                    return Err(ServiceError::Store(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryContentStore;
    use serde_json::json;

    const PATH: &str = "list.json";

    fn list(store: &Arc<MemoryContentStore>) -> ListStore {
        ListStore::new(store.clone(), PATH, "test").with_legacy_key("subscribers")
    }

    fn append(value: Value) -> impl FnMut(Vec<Value>) -> Mutation<Value, usize> {
        move |mut items| {
            items.push(value.clone());
            let len = items.len();
            Mutation::Replace { items, outcome: len }
        }
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty_without_revision() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        let snap = list(&store).read().await?;
        assert!(snap.items.is_empty());
        assert!(snap.revision.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn garbage_reads_as_empty_but_keeps_revision() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        let rev = store.seed(PATH, "not json {").await;
        let snap = list(&store).read().await?;
        assert!(snap.items.is_empty());
        assert_eq!(snap.revision, Some(rev));

        store.seed(PATH, r#"{"other": [1]}"#).await;
        assert!(list(&store).read().await?.items.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn legacy_object_shape_is_unwrapped() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        store.seed(PATH, r#"{"subscribers": ["a@b.co"]}"#).await;
        let snap = list(&store).read().await?;
        assert_eq!(snap.items, vec![json!("a@b.co")]);

        // 未配置 legacy key 时不解包
        let plain = ListStore::new(store.clone(), PATH, "test");
        assert!(plain.read().await?.items.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn write_is_pretty_printed() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        list(&store).write(&["a", "b"], None).await?;
        let text = String::from_utf8(store.contents(PATH).await.unwrap())?;
        assert_eq!(text, "[\n  \"a\",\n  \"b\"\n]");
        Ok(())
    }

    #[tokio::test]
    async fn keep_performs_no_write() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        let out = list(&store)
            .modify(|_items| Mutation::<Value, &str>::Keep("noop"))
            .await?;
        assert_eq!(out, "noop");
        assert_eq!(store.put_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn conflict_rereads_and_reapplies() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        store.seed(PATH, "[1]").await;
        store.interleave_write(PATH, "[1,2]").await;

        let len = list(&store).modify(append(json!(3))).await?;
        assert_eq!(len, 3);
        assert_eq!(store.json(PATH).await, Some(json!([1, 2, 3])));
        assert_eq!(store.fetch_count(), 2);
        assert_eq!(store.put_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn second_conflict_exhausts_retries() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        store.seed(PATH, "[]").await;
        store.interleave_write(PATH, "[7]").await;
        store.interleave_write(PATH, "[7,8]").await;

        let err = list(&store).modify(append(json!(1))).await.unwrap_err();
        assert!(matches!(err, ServiceError::RetriesExhausted { attempts: 2, .. }));
        assert_eq!(store.put_count(), 2);
        assert_eq!(store.json(PATH).await, Some(json!([7, 8])));
        Ok(())
    }

    #[tokio::test]
    async fn configured_attempts_bound_the_loop() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        store.seed(PATH, "[]").await;
        for i in 0..3 {
            store.interleave_write(PATH, format!("[{i}]")).await;
        }
        let lst = list(&store).with_retry(RetryPolicy::new(4, Default::default(), Default::default()));
        let len = lst.modify(append(json!("x"))).await?;
        assert_eq!(len, 2);
        assert_eq!(store.put_count(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn other_store_errors_are_not_retried() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        store
            .fail_next_put(StoreError::Status { path: PATH.into(), status: 401, message: "Bad credentials".into() })
            .await;
        let err = list(&store).modify(append(json!(1))).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Status { status: 401, .. })));
        assert_eq!(store.put_count(), 1);
        assert_eq!(store.fetch_count(), 1);
        Ok(())
    }
}
