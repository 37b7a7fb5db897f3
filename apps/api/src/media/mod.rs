//! Size- and time-bounded HTTP fetching for inbound fax images and for remote
//! image blocks, with an optional byte cache in front of the network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::document::blocks::{ContentBlock, ImageSource};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl MediaError {
    /// 4xx responses will not get better on retry; everything else might.
    pub fn is_retryable(&self) -> bool {
        match self {
            MediaError::Status(code) => *code == 429 || *code >= 500,
            MediaError::TooLarge { .. } => false,
            MediaError::Http(_) | MediaError::Timeout(_) => true,
        }
    }
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError>;
}

/// Plain HTTP GET with a byte ceiling and an overall deadline.
#[derive(Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
    max_bytes: usize,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(max_bytes: usize, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            max_bytes,
            timeout,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        let mut response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Status(status.as_u16()));
        }
        if let Some(len) = response.content_length() {
            if len as usize > self.max_bytes {
                return Err(MediaError::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        // Content-Length can lie or be absent; enforce the ceiling while streaming.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(MediaError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        tokio::time::timeout(self.timeout, self.download(url))
            .await
            .map_err(|_| MediaError::Timeout(self.timeout))?
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cache
// ────────────────────────────────────────────────────────────────────────────

/// Best-effort byte cache. Failures are logged by callers and never surface.
#[async_trait]
pub trait ByteCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn put(&self, key: &str, bytes: &[u8], ttl_secs: u64);
}

pub struct RedisByteCache {
    client: redis::Client,
}

impl RedisByteCache {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ByteCache for RedisByteCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Image cache unavailable");
                return None;
            }
        };
        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(key, error = %e, "Image cache read failed");
                None
            }
        }
    }

    async fn put(&self, key: &str, bytes: &[u8], ttl_secs: u64) {
        let result = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            conn.set_ex::<_, _, ()>(key, bytes, ttl_secs).await
        }
        .await;
        if let Err(e) = result {
            warn!(key, error = %e, "Image cache write failed");
        }
    }
}

pub fn cache_key(url: &str) -> String {
    format!("img:{}", hex::encode(Sha256::digest(url.as_bytes())))
}

/// Serves repeat URLs from the cache and fills it on a miss.
pub struct CachedFetcher {
    inner: Arc<dyn ImageFetcher>,
    cache: Arc<dyn ByteCache>,
    ttl_secs: u64,
}

impl CachedFetcher {
    pub fn new(inner: Arc<dyn ImageFetcher>, cache: Arc<dyn ByteCache>, ttl_secs: u64) -> Self {
        Self {
            inner,
            cache,
            ttl_secs,
        }
    }
}

#[async_trait]
impl ImageFetcher for CachedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        let key = cache_key(url);
        if let Some(bytes) = self.cache.get(&key).await {
            debug!(url, bytes = bytes.len(), "Image cache hit");
            return Ok(bytes);
        }
        let bytes = self.inner.fetch(url).await?;
        self.cache.put(&key, &bytes, self.ttl_secs).await;
        Ok(bytes)
    }
}

/// Replaces every remote image source with its bytes. A failed fetch leaves the
/// source as a URL, which the rasterizer treats as a failed image.
pub async fn resolve_images(blocks: &mut [ContentBlock], fetcher: &dyn ImageFetcher) -> usize {
    let mut failures = 0;
    for block in blocks.iter_mut() {
        let ContentBlock::Image(image) = block else {
            continue;
        };
        let ImageSource::Url { url } = &image.source else {
            continue;
        };
        match fetcher.fetch(url).await {
            Ok(data) => image.source = ImageSource::Inline { data },
            Err(e) => {
                warn!(url = %url, error = %e, "Remote image fetch failed, fallback will be used");
                failures += 1;
            }
        }
    }
    failures
}
