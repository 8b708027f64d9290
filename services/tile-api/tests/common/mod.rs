//! Shared fixtures for tile-api integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use renderer::CategoryTable;
use storage::{RangeSource, RangeStatsSnapshot, StorageResult};
use test_utils::{bbox, colors, GeoTiffBuilder, GeoTiffLayout, StaticResolver};
use tile_api::legend::{LegendCache, LegendError, LegendFetcher};
use tile_api::sources::{parse_sources, SourceRegistry};
use tile_api::{ServiceConfig, TileRenderPipeline};

/// Three sources over the same synthetic files:
/// - `fuel`: lenient, categorical through the `fbfm40` legend
/// - `gray`: strict, continuous black to white over 0..10
/// - `gray_lenient`: as `gray`, but lenient
pub const SOURCES_YAML: &str = r##"
sources:
  - name: fuel
    url: memory://fuel.tif
    strictness: lenient
    nodata: -9999
    color:
      mode: categorical
      legend: fbfm40
  - name: gray
    url: memory://gray.tif
    strictness: strict
    color:
      mode: continuous
      stops:
        - { value: 0, color: "#000000" }
        - { value: 10, color: "#ffffff" }
  - name: gray_lenient
    url: memory://gray.tif
    strictness: lenient
    color:
      mode: continuous
      stops:
        - { value: 0, color: "#000000" }
        - { value: 10, color: "#ffffff" }
"##;

/// Serves the fixture fuel legend.
pub struct FixtureLegends;

#[async_trait]
impl LegendFetcher for FixtureLegends {
    async fn fetch(&self, _legend_ref: &str) -> Result<CategoryTable, LegendError> {
        Ok(CategoryTable::from_json(colors::FUEL_LEGEND_JSON)?)
    }
}

pub fn service_config(max_concurrent_tiles: usize, soft: u64, hard: u64) -> ServiceConfig {
    ServiceConfig {
        max_concurrent_tiles,
        soft_pixel_budget: soft,
        hard_pixel_ceiling: hard,
        ..ServiceConfig::default()
    }
}

pub fn default_config() -> ServiceConfig {
    ServiceConfig::default()
}

pub fn build_pipeline(
    config: &ServiceConfig,
    resolver: Arc<StaticResolver>,
) -> Arc<TileRenderPipeline> {
    let registry = Arc::new(SourceRegistry::new(
        parse_sources(SOURCES_YAML).expect("fixture yaml"),
        resolver,
        config.reader.clone(),
    ));
    let legends = Arc::new(LegendCache::new(Arc::new(FixtureLegends)));
    Arc::new(TileRenderPipeline::from_config(config, registry, legends))
}

/// A 256x256 constant-valued raster over northern California, in 64px
/// internal tiles, with `overviews` reduced levels.
pub fn norcal_tiff(value: f32, overviews: usize) -> (Vec<u8>, GeoTiffLayout) {
    let (min_lon, min_lat, max_lon, max_lat) = bbox::NORCAL;
    GeoTiffBuilder::new(256, 256, vec![value; 256 * 256])
        .tile_size(64)
        .overviews(overviews)
        .bbox(min_lon, min_lat, max_lon, max_lat)
        .build_with_layout()
}

/// Delays every read that starts at or after `slow_from`.
#[derive(Debug)]
pub struct SlowSource {
    inner: Arc<dyn RangeSource>,
    slow_from: u64,
    delay: Duration,
}

impl SlowSource {
    pub fn new(inner: Arc<dyn RangeSource>, slow_from: u64, delay: Duration) -> Self {
        Self {
            inner,
            slow_from,
            delay,
        }
    }
}

#[async_trait]
impl RangeSource for SlowSource {
    async fn get_range(&self, range: Range<u64>) -> StorageResult<Bytes> {
        if range.start >= self.slow_from {
            tokio::time::sleep(self.delay).await;
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
