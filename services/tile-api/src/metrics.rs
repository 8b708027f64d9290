//! Prometheus metrics for the tile pipeline.
//!
//! Recorded through the `metrics` facade; the binary installs the
//! Prometheus recorder and serves it at `GET /metrics`. Without a recorder
//! (tests), every call is a no-op.

use ::metrics::{counter, gauge, histogram};
use async_trait::async_trait;
use bytes::Bytes;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use storage::{RangeSource, RangeStatsSnapshot, StorageResult};

pub const TILES_RENDERED: &str = "tiles_rendered_total";
pub const TILE_RENDER_ERRORS: &str = "tile_render_errors_total";
pub const TILE_RENDER_SECONDS: &str = "tile_render_seconds";
pub const GATE_ACTIVE: &str = "gate_active";
pub const GATE_WAIT_SECONDS: &str = "gate_wait_seconds";
pub const RASTER_BYTES_FETCHED: &str = "raster_bytes_fetched_total";
pub const READ_RETRIES: &str = "tile_read_retries_total";
pub const LEGEND_FALLBACKS: &str = "legend_fallbacks_total";

/// How a tile job ended, as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Rendered,
    /// Outside the enforced or true extent.
    Transparent,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Rendered => "rendered",
            Outcome::Transparent => "transparent",
            Outcome::Failed => "failed",
        }
    }
}

pub fn record_tile(outcome: Outcome, elapsed: Duration) {
    counter!(TILES_RENDERED, "outcome" => outcome.as_str()).increment(1);
    histogram!(TILE_RENDER_SECONDS, "outcome" => outcome.as_str()).record(elapsed.as_secs_f64());
}

pub fn record_error(kind: &'static str) {
    counter!(TILE_RENDER_ERRORS, "kind" => kind).increment(1);
}

pub fn record_gate_admit(waited: Duration) {
    gauge!(GATE_ACTIVE).increment(1.0);
    histogram!(GATE_WAIT_SECONDS).record(waited.as_secs_f64());
}

pub fn record_gate_release() {
    gauge!(GATE_ACTIVE).decrement(1.0);
}

pub fn record_bytes_fetched(source: &str, bytes: u64) {
    if bytes > 0 {
        counter!(RASTER_BYTES_FETCHED, "source" => source.to_string()).increment(bytes);
    }
}

/// Counts every byte a raster source transfers, header reads included.
#[derive(Debug)]
pub struct MeteredSource {
    source_name: String,
    inner: Arc<dyn RangeSource>,
}

impl MeteredSource {
    pub fn new(source_name: impl Into<String>, inner: Arc<dyn RangeSource>) -> Self {
        Self {
            source_name: source_name.into(),
            inner,
        }
    }
}

#[async_trait]
impl RangeSource for MeteredSource {
    async fn get_range(&self, range: Range<u64>) -> StorageResult<Bytes> {
        let bytes = self.inner.get_range(range).await?;
        record_bytes_fetched(&self.source_name, bytes.len() as u64);
        Ok(bytes)
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

pub fn record_retry(source: &str) {
    counter!(READ_RETRIES, "source" => source.to_string()).increment(1);
}

pub fn record_legend_fallback(legend: &str) {
    counter!(LEGEND_FALLBACKS, "legend" => legend.to_string()).increment(1);
}

/// Run `f` with a local Prometheus recorder and return its rendering.
#[cfg(test)]
pub(crate) fn capture<T>(f: impl FnOnce() -> T) -> (T, String) {
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let out = ::metrics::with_local_recorder(&recorder, f);
    (out, handle.render())
}
