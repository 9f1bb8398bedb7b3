//! Media staging: pull a tenant's file from the object store, publish it,
//! and point the NFT metadata at the published copy.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::domain::{MediaRef, ProjectId};
use crate::ports::{ObjectStore, ObjectStoreError};

/// Prefix under which staged files are published.
const PUBLISHED_PREFIX: &str = "published";

#[derive(Clone)]
pub struct MediaStager {
    objects: Arc<dyn ObjectStore>,
    work_dir: PathBuf,
}

impl MediaStager {
    pub fn new(objects: Arc<dyn ObjectStore>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects,
            work_dir: work_dir.into(),
        }
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    /// Publishes `media` and returns its public URL. A local copy left over
    /// from an earlier attempt is reused instead of downloaded again; the
    /// copy is removed once the upload succeeds.
    ///
    /// Both the staged copy and the published key live under the source
    /// object's key, so two objects sharing a file name never meet.
    pub async fn publish(&self, project: ProjectId, media: &MediaRef) -> Result<String, ObjectStoreError> {
        if let Some(url) = &media.url {
            return Ok(url.clone());
        }
        let file_name = Self::file_name(media)?;
        let source = Self::source_dir(media)?;
        let local = self
            .work_dir
            .join(project.to_string())
            .join(&source)
            .join(&file_name);

        if tokio::fs::try_exists(&local).await? {
            debug!(file = %local.display(), "reusing staged media");
        } else {
            if let Some(parent) = local.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            self.objects.download(&media.remote_key, &local).await?;
        }

        let remote_key = format!("{PUBLISHED_PREFIX}/{project}/{source}/{file_name}");
        let url = self.objects.upload(&local, &remote_key).await?;
        Self::discard(&local).await;
        debug!(%url, "media published");
        Ok(url)
    }

    /// Only the last path component is used locally.
    fn file_name(media: &MediaRef) -> Result<String, ObjectStoreError> {
        Path::new(&media.file_name)
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| ObjectStoreError::Backend(format!("invalid media file name {:?}", media.file_name)))
    }

    /// The source key's components, rejoined with `/`. Anything but plain
    /// names is refused so the staged copy stays under `work_dir`.
    fn source_dir(media: &MediaRef) -> Result<String, ObjectStoreError> {
        let mut parts = Vec::new();
        for component in Path::new(&media.remote_key).components() {
            match component {
                Component::Normal(part) => match part.to_str() {
                    Some(part) => parts.push(part),
                    None => return Err(Self::invalid_key(media)),
                },
                _ => return Err(Self::invalid_key(media)),
            }
        }
        if parts.is_empty() {
            return Err(Self::invalid_key(media));
        }
        Ok(parts.join("/"))
    }

    fn invalid_key(media: &MediaRef) -> ObjectStoreError {
        ObjectStoreError::Backend(format!("invalid media key {:?}", media.remote_key))
    }

    async fn discard(path: &Path) {
        if let Err(err) = tokio::fs::remove_file(path).await {
            debug!(file = %path.display(), error = %err, "could not remove staged media");
        }
    }
}
