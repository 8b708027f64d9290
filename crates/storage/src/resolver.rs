//! Resolving configured source URLs to range sources.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::StorageResult;
use crate::object_store::{ObjectStorage, ObjectStorageConfig};
use crate::range::RangeSource;

/// Turns a source URL from configuration into a readable archive.
#[async_trait]
pub trait RangeResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> StorageResult<Arc<dyn RangeSource>>;
}

/// Resolves URLs through `object_store` (HTTP, S3, local files).
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreResolver {
    config: ObjectStorageConfig,
}

impl ObjectStoreResolver {
    pub fn new(config: ObjectStorageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RangeResolver for ObjectStoreResolver {
    async fn resolve(&self, url: &str) -> StorageResult<Arc<dyn RangeSource>> {
        Ok(Arc::new(ObjectStorage::from_url(url, &self.config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[tokio::test]
    async fn test_resolves_http_url() {
        let resolver = ObjectStoreResolver::default();
        let source = resolver
            .resolve("https://data.example.com/fuel/fbfm40_cog.tif")
            .await
            .unwrap();
        assert_eq!(source.identifier(), "https://data.example.com/fuel/fbfm40_cog.tif");
    }

    #[tokio::test]
    async fn test_rejects_bad_url() {
        let resolver = ObjectStoreResolver::default();
        assert!(matches!(
            resolver.resolve("s3://bucket").await,
            Err(StorageError::InvalidLocation(_))
        ));
    }
}
