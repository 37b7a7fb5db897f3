use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{validate_key, ObjectStore, StorageError};

/// Filesystem store used by mock delivery and local development.
/// Locators are `file://` URLs and are returned unchanged by `presigned_url`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        let absolute = tokio::fs::canonicalize(&path).await?;
        debug!(path = %absolute.display(), bytes = bytes.len(), "Stored object locally");
        Ok(format!("file://{}", absolute.display()))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn presigned_url(&self, locator: &str, _ttl: Duration) -> Result<String, StorageError> {
        if !locator.starts_with("file://") {
            return Err(StorageError::ForeignLocator(locator.to_string()));
        }
        Ok(locator.to_string())
    }
}
