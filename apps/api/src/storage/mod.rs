// Retrievable storage for inbound images and rendered faxes.
// `put` returns a locator string; `presigned_url` turns it into something the fax
// gateway can GET for a limited time.

pub mod local;
pub mod s3;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use local::LocalStore;
pub use s3::S3Store;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("locator {0} does not belong to this store")]
    ForeignLocator(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, StorageError>;

    /// `Ok(None)` when nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn presigned_url(&self, locator: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Keys are relative, slash-separated paths with no parent references.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("inbound/fax-1").is_ok());
        assert!(validate_key("outbound/FX-2025-000001.pdf").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("inbound/../../x").is_err());
        assert!(validate_key("a//b").is_err());
    }
}
