//! Object storage transport for raster archives (HTTP, S3, local, memory).

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{
    aws::AmazonS3Builder, http::HttpBuilder, local::LocalFileSystem, memory::InMemory,
    path::Path, ObjectStore,
};
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};
use crate::range::{RangeSource, RangeStats, RangeStatsSnapshot};

/// Connection settings shared by all sources opened from URLs.
#[derive(Debug, Clone, Default)]
pub struct ObjectStorageConfig {
    /// Custom S3 endpoint (MinIO etc.); `None` uses AWS.
    pub s3_endpoint: Option<String>,
    /// Allow plain-HTTP S3 endpoints.
    pub allow_http: bool,
}

impl ObjectStorageConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            s3_endpoint: std::env::var("S3_ENDPOINT").ok(),
            allow_http: std::env::var("S3_ALLOW_HTTP")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

/// A single raster archive inside an object store.
///
/// Holds the store handle and the object's location; every read is a
/// ranged GET. The object size is fetched once on first use.
#[derive(Debug)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    location: Path,
    identifier: String,
    size: OnceCell<u64>,
    stats: RangeStats,
}

impl ObjectStorage {
    /// Wrap an existing store and object location.
    pub fn new(store: Arc<dyn ObjectStore>, location: Path, identifier: impl Into<String>) -> Self {
        Self {
            store,
            location,
            identifier: identifier.into(),
            size: OnceCell::new(),
            stats: RangeStats::new(),
        }
    }

    /// Resolve a source URL to a store.
    ///
    /// Supported forms: `http(s)://host/path`, `s3://bucket/key`,
    /// `file:///abs/path` or a bare filesystem path. No I/O happens here.
    pub fn from_url(url: &str, config: &ObjectStorageConfig) -> StorageResult<Self> {
        if let Some(rest) = url
            .strip_prefix("https://")
            .map(|r| ("https", r))
            .or_else(|| url.strip_prefix("http://").map(|r| ("http", r)))
        {
            let (scheme, rest) = rest;
            let (host, key) = split_host_key(rest, url)?;
            let store = HttpBuilder::new()
                .with_url(format!("{}://{}", scheme, host))
                .build()
                .map_err(|e| StorageError::client_failed(url, e.to_string()))?;
            return Ok(Self::new(Arc::new(store), Path::from(key), url));
        }

        if let Some(rest) = url.strip_prefix("s3://") {
            let (bucket, key) = split_host_key(rest, url)?;
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(endpoint) = &config.s3_endpoint {
                builder = builder.with_endpoint(endpoint);
            }
            if config.allow_http {
                builder = builder.with_allow_http(true);
            }
            let store = builder
                .build()
                .map_err(|e| StorageError::client_failed(url, e.to_string()))?;
            return Ok(Self::new(Arc::new(store), Path::from(key), url));
        }

        let fs_path = url.strip_prefix("file://").unwrap_or(url);
        if fs_path.is_empty() {
            return Err(StorageError::InvalidLocation(url.to_string()));
        }
        let location = Path::from_filesystem_path(fs_path)
            .map_err(|e| StorageError::client_failed(url, e.to_string()))?;
        Ok(Self::new(Arc::new(LocalFileSystem::new()), location, url))
    }

    /// Store `data` in a fresh in-memory store. Used by tests and fixtures.
    pub async fn in_memory(name: &str, data: Bytes) -> StorageResult<Self> {
        let store = InMemory::new();
        let location = Path::from(name);
        store.put(&location, data.into()).await?;
        Ok(Self::new(
            Arc::new(store),
            location,
            format!("memory://{}", name),
        ))
    }
}

#[async_trait]
impl RangeSource for ObjectStorage {
    #[instrument(skip(self), fields(source = %self.identifier))]
    async fn get_range(&self, range: Range<u64>) -> StorageResult<Bytes> {
        if range.start >= range.end {
            return Ok(Bytes::new());
        }

        let bytes = self
            .store
            .get_range(&self.location, range.start as usize..range.end as usize)
            .await
            .map_err(|e| StorageError::range_failed(&self.identifier, &range, e.to_string()))?;

        self.stats.record(bytes.len());
        debug!(start = range.start, len = bytes.len(), "Read range");
        Ok(bytes)
    }

    async fn size(&self) -> StorageResult<u64> {
        self.size
            .get_or_try_init(|| async {
                let meta = self.store.head(&self.location).await?;
                Ok::<u64, StorageError>(meta.size as u64)
            })
            .await
            .copied()
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn stats(&self) -> RangeStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Split "host/key/parts" into ("host", "key/parts").
fn split_host_key<'a>(rest: &'a str, url: &str) -> StorageResult<(&'a str, &'a str)> {
    match rest.split_once('/') {
        Some((host, key)) if !host.is_empty() && !key.is_empty() => Ok((host, key)),
        _ => Err(StorageError::InvalidLocation(url.to_string())),
    }
}
