use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use tracing::info;

use super::{validate_key, ObjectStore, StorageError};

/// S3 / MinIO bucket. Locators look like `s3://<bucket>/<key>`.
#[derive(Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn locator(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    fn key_of<'a>(&self, locator: &'a str) -> Result<&'a str, StorageError> {
        locator
            .strip_prefix("s3://")
            .and_then(|rest| rest.strip_prefix(self.bucket.as_str()))
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| StorageError::ForeignLocator(locator.to_string()))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        validate_key(key)?;
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("upload failed: {e}")))?;

        info!("Uploaded {size} bytes to s3://{}/{}", self.bucket, key);
        Ok(self.locator(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    return Ok(None);
                }
                return Err(StorageError::S3(format!("download failed: {service}")));
            }
        };
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(format!("body read failed: {e}")))?;
        Ok(Some(body.into_bytes().to_vec()))
    }

    async fn presigned_url(&self, locator: &str, ttl: Duration) -> Result<String, StorageError> {
        let key = self.key_of(locator)?;
        let config = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::S3(format!("invalid presign ttl: {e}")))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| StorageError::S3(format!("presign failed: {e}")))?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

    fn store() -> S3Store {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("key", "secret", None, None, "test"))
            .endpoint_url("http://localhost:9000")
            .force_path_style(true)
            .build();
        S3Store::new(aws_sdk_s3::Client::from_conf(config), "faxes")
    }

    #[test]
    fn test_locator_round_trip() {
        let store = store();
        let locator = store.locator("outbound/FX-2025-000001.pdf");
        assert_eq!(locator, "s3://faxes/outbound/FX-2025-000001.pdf");
        assert_eq!(store.key_of(&locator).unwrap(), "outbound/FX-2025-000001.pdf");
        assert!(store.key_of("s3://other/outbound/x.pdf").is_err());
        assert!(store.key_of("file:///tmp/x").is_err());
    }
}
