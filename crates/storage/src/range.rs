//! Byte-range access to raster archives.

use async_trait::async_trait;
use bytes::Bytes;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::StorageResult;

/// Partial-content access to a single archive.
///
/// Cloud-optimized rasters are laid out so a reader only ever needs the
/// header and the internal tiles covering a window; implementations map
/// each call to one ranged request against the backing store.
#[async_trait]
pub trait RangeSource: Send + Sync + std::fmt::Debug {
    /// Fetch the bytes in `range` (end exclusive).
    ///
    /// Ranges past the end of the object are truncated by the store.
    async fn get_range(&self, range: Range<u64>) -> StorageResult<Bytes>;

    /// Total size of the archive in bytes.
    async fn size(&self) -> StorageResult<u64>;

    /// Human-readable identifier (URL or path) for logs and errors.
    fn identifier(&self) -> &str;

    /// Transfer counters for this source.
    fn stats(&self) -> RangeStatsSnapshot;
}

/// Transfer counters, updated atomically by range sources.
#[derive(Debug, Default)]
pub struct RangeStats {
    requests: AtomicU64,
    bytes: AtomicU64,
}

impl RangeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed request of `len` bytes.
    pub fn record(&self, len: usize) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RangeStatsSnapshot {
        RangeStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RangeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeStatsSnapshot {
    pub requests: u64,
    pub bytes: u64,
}
