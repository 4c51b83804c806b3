use async_trait::async_trait;
use thiserror::Error;

/// Opaque version marker handed out by the store on read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw file content plus the revision it was read at.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub content: Vec<u8>,
    pub revision: Revision,
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The revision supplied with a write is no longer current.
    #[error("revision conflict on {path}")]
    Conflict { path: String },
    #[error("store returned {status} for {path}: {message}")]
    Status { path: String, status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Blob store keyed by path with optimistic-concurrency writes.
///
/// `put` with `expected = None` creates the file and must fail with
/// `StoreError::Conflict` if it already exists; `put` with `Some(rev)` must
/// fail with `Conflict` unless `rev` is the current revision.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// `Ok(None)` when nothing is stored at `path` yet.
    async fn fetch(&self, path: &str) -> Result<Option<StoredBlob>, StoreError>;

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        expected: Option<&Revision>,
    ) -> Result<Revision, StoreError>;
}
