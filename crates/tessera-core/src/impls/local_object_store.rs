//! Directory-backed ObjectStore.
//!
//! Objects live under `root/<key>`; published URLs are `file://` URLs
//! unless a public base URL is configured.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::ports::{ObjectStore, ObjectStoreError};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base: Option<String>,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_base: None,
        }
    }

    /// Serve published objects as `<base>/<key>`.
    pub fn with_public_base(mut self, base: impl Into<String>) -> Self {
        self.public_base = Some(base.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(ObjectStoreError::Backend(format!("invalid object key {key:?}")));
        }
        Ok(self.root.join(relative))
    }

    fn url_for(&self, key: &str, path: &Path) -> String {
        match &self.public_base {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!("file://{}", path.display()),
        }
    }

    async fn ensure_parent(path: &Path) -> Result<(), ObjectStoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn download(&self, remote_key: &str, local_path: &Path) -> Result<(), ObjectStoreError> {
        let source = self.object_path(remote_key)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(ObjectStoreError::NotFound(remote_key.to_string()));
        }
        Self::ensure_parent(local_path).await?;
        tokio::fs::copy(&source, local_path).await?;
        Ok(())
    }

    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<String, ObjectStoreError> {
        if !tokio::fs::try_exists(local_path).await? {
            return Err(ObjectStoreError::NotFound(local_path.display().to_string()));
        }
        let target = self.object_path(remote_key)?;
        Self::ensure_parent(&target).await?;
        tokio::fs::copy(local_path, &target).await?;
        Ok(self.url_for(remote_key, &target))
    }

    async fn put_json(&self, remote_key: &str, value: &Value) -> Result<String, ObjectStoreError> {
        let target = self.object_path(remote_key)?;
        Self::ensure_parent(&target).await?;
        let body = serde_json::to_vec_pretty(value)
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        tokio::fs::write(&target, body).await?;
        Ok(self.url_for(remote_key, &target))
    }
}
