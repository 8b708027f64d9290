//! Range sources for tests: in-memory archives and fault injection.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use storage::{
    ObjectStorage, RangeResolver, RangeSource, RangeStatsSnapshot, StorageError, StorageResult,
};

/// Serve `data` from an in-memory object store.
pub async fn memory_source(name: &str, data: Vec<u8>) -> Arc<dyn RangeSource> {
    let storage = ObjectStorage::in_memory(name, Bytes::from(data))
        .await
        .expect("in-memory put cannot fail");
    Arc::new(storage)
}

/// Wraps a source and fails every read that starts inside one of the
/// poisoned byte ranges.
#[derive(Debug)]
pub struct FailingRangeSource {
    inner: Arc<dyn RangeSource>,
    poisoned: Vec<Range<u64>>,
    failures: AtomicU64,
}

impl FailingRangeSource {
    pub fn new(inner: Arc<dyn RangeSource>, poisoned: Vec<Range<u64>>) -> Self {
        Self {
            inner,
            poisoned,
            failures: AtomicU64::new(0),
        }
    }

    /// Number of reads that were failed on purpose.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RangeSource for FailingRangeSource {
    async fn get_range(&self, range: Range<u64>) -> StorageResult<Bytes> {
        if self.poisoned.iter().any(|p| p.contains(&range.start)) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(StorageError::Transport(format!(
                "injected failure at {}..{}",
                range.start, range.end
            )));
        }
        self.inner.get_range(range).await
    }

    async fn size(&self) -> StorageResult<u64> {
        self.inner.size().await
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }

    fn stats(&self) -> RangeStatsSnapshot {
        self.inner.stats()
    }
}

/// Resolves URLs to pre-registered sources and counts resolutions.
///
/// Unregistered URLs fail with `StorageError::NotFound`.
#[derive(Debug, Default)]
pub struct StaticResolver {
    sources: HashMap<String, Arc<dyn RangeSource>>,
    resolved: AtomicU64,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, url: &str, source: Arc<dyn RangeSource>) -> Self {
        self.sources.insert(url.to_string(), source);
        self
    }

    /// Number of successful `resolve` calls.
    pub fn resolved(&self) -> u64 {
        self.resolved.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RangeResolver for StaticResolver {
    async fn resolve(&self, url: &str) -> StorageResult<Arc<dyn RangeSource>> {
        let source = self
            .sources
            .get(url)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(url.to_string()))?;
        self.resolved.fetch_add(1, Ordering::Relaxed);
        Ok(source)
    }
}
