use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

pub const JSON_CONTENT_TYPE: &str = "application/json";

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid object key: {0:?}")]
    InvalidKey(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Flat key/value object storage with `/`-separated keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()>;

    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Keys starting with `prefix`, in ascending lexicographic order.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

pub type SharedObjectStore = Arc<dyn ObjectStore>;

pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn ObjectStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let body = serde_json::to_vec(value)?;
    store.put(key, Bytes::from(body), JSON_CONTENT_TYPE).await
}

/// Rejects keys that could escape a store root or collide with directories.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && !key.contains('\\')
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
