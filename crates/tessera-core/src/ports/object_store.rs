//! ObjectStore port: tenant media and published artifacts.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::ChainError;

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object {0} not found")]
    NotFound(String),

    #[error("object store i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("object store backend failure: {0}")]
    Backend(String),
}

/// A missing object is permanent; everything else is worth retrying.
impl From<ObjectStoreError> for ChainError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::NotFound(_) => ChainError::missing(err.to_string()),
            ObjectStoreError::Io(_) | ObjectStoreError::Backend(_) => {
                ChainError::infrastructure(err.to_string())
            }
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Copies the object at `remote_key` to `local_path`.
    async fn download(&self, remote_key: &str, local_path: &Path) -> Result<(), ObjectStoreError>;

    /// Publishes a local file and returns its public URL.
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<String, ObjectStoreError>;

    /// Publishes a JSON document and returns its public URL.
    async fn put_json(&self, remote_key: &str, value: &Value) -> Result<String, ObjectStoreError>;
}
