//! End-to-end tile rendering through the pipeline, against in-memory
//! GeoTIFF sources.

mod common;

use std::sync::Arc;

use test_utils::{
    assert_rgba_near, memory_source, tiles, FailingRangeSource, GeoTiffBuilder, GeoTiffLayout,
    StaticResolver,
};
use tile_api::{OutOfBounds, RenderOutcome, ServiceConfig};
use tile_common::TileError;
use tokio_util::sync::CancellationToken;

use common::{build_pipeline, default_config, norcal_tiff, service_config};

/// Prefetch exactly the metadata block so that every tile read goes
/// through the range source.
fn header_only(mut config: ServiceConfig, layout: &GeoTiffLayout) -> ServiceConfig {
    config.reader.header_prefetch_bytes = layout.header_len as usize;
    config
}

async fn poisoned(
    url: &str,
    data: Vec<u8>,
    ranges: Vec<std::ops::Range<u64>>,
) -> Arc<FailingRangeSource> {
    Arc::new(FailingRangeSource::new(memory_source(url, data).await, ranges))
}

#[tokio::test]
async fn test_outside_enforced_extent_is_transparent_without_io() {
    let (bytes, _) = norcal_tiff(2.0, 0);
    let resolver = Arc::new(
        StaticResolver::new()
            .with_source("memory://fuel.tif", memory_source("fuel.tif", bytes).await),
    );
    let pipeline = build_pipeline(&default_config(), Arc::clone(&resolver));

    let (z, x, y) = tiles::OUTSIDE_CONUS;
    let outcome = pipeline
        .render_tile("fuel", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RenderOutcome::Transparent {
            size: 256,
            reason: OutOfBounds::EnforcedExtent
        }
    );
    assert_eq!(resolver.resolved(), 0);
    assert!(!pipeline.registry().is_open("fuel"));
    assert_eq!(pipeline.gate().stats().admitted, 0);

    let tile = outcome.into_tile();
    assert_eq!((tile.width, tile.height), (256, 256));
    assert!(tile.is_fully_transparent());
}

#[tokio::test]
async fn test_outside_source_extent_is_transparent_without_decoding() {
    let (bytes, layout) = norcal_tiff(2.0, 0);
    let source = poisoned("fuel.tif", bytes, layout.level_data.clone()).await;
    let resolver = Arc::new(StaticResolver::new().with_source("memory://fuel.tif", source.clone()));
    let pipeline = build_pipeline(&header_only(default_config(), &layout), resolver);

    let (z, x, y) = tiles::TEXAS_Z6;
    let outcome = pipeline
        .render_tile("fuel", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RenderOutcome::Transparent {
            size: 256,
            reason: OutOfBounds::SourceExtent
        }
    );
    assert!(pipeline.registry().is_open("fuel"));
    assert_eq!(source.failures(), 0);
    assert_eq!(pipeline.gate().active(), 0);
}

#[tokio::test]
async fn test_categorical_tile_uses_legend_colors() {
    let (bytes, _) = norcal_tiff(2.0, 0);
    let resolver = Arc::new(
        StaticResolver::new()
            .with_source("memory://fuel.tif", memory_source("fuel.tif", bytes).await),
    );
    let pipeline = build_pipeline(&default_config(), resolver);

    let (z, x, y) = tiles::NORCAL_Z6;
    let outcome = pipeline
        .render_tile("fuel", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!outcome.is_transparent());

    let tile = outcome.into_tile();
    // Top-left lies inside the raster, bottom-right south-east of it.
    assert_eq!(tile.pixel(0, 0), Some([173, 221, 142, 255]));
    assert_eq!(tile.pixel(255, 255).map(|p| p[3]), Some(0));
}

#[tokio::test]
async fn test_continuous_tile_interpolates_ramp() {
    let (bytes, _) = norcal_tiff(5.0, 1);
    let resolver = Arc::new(
        StaticResolver::new()
            .with_source("memory://gray.tif", memory_source("gray.tif", bytes).await),
    );
    let pipeline = build_pipeline(&default_config(), resolver);

    let (z, x, y) = tiles::NORCAL_Z6;
    let tile = pipeline
        .render_tile("gray", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap()
        .into_tile();

    let pixel = tile.pixel(10, 10).unwrap();
    assert_rgba_near!(&pixel, [128, 128, 128, 255], 1);
}

#[tokio::test]
async fn test_tile_size_is_respected() {
    let (bytes, _) = norcal_tiff(5.0, 0);
    let resolver = Arc::new(
        StaticResolver::new()
            .with_source("memory://gray.tif", memory_source("gray.tif", bytes).await),
    );
    let pipeline = build_pipeline(&default_config(), resolver);

    let (z, x, y) = tiles::NORCAL_Z6;
    let tile = pipeline
        .render_tile("gray", z, x, y, 512, &CancellationToken::new())
        .await
        .unwrap()
        .into_tile();
    assert_eq!((tile.width, tile.height), (512, 512));
    assert_eq!(tile.pixels.len(), 512 * 512 * 4);
}

#[tokio::test]
async fn test_strict_source_too_coarse_reads_no_data() {
    let (bytes, layout) = norcal_tiff(5.0, 0);
    let source = poisoned("gray.tif", bytes, layout.level_data.clone()).await;
    let resolver = Arc::new(StaticResolver::new().with_source("memory://gray.tif", source.clone()));
    let pipeline = build_pipeline(&header_only(service_config(4, 100, 1_000), &layout), resolver);

    let (z, x, y) = tiles::NORCAL_Z6;
    let err = pipeline
        .render_tile("gray", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        TileError::SourceTooCoarse {
            source_name,
            estimated_pixels,
            ceiling,
        } => {
            assert_eq!(source_name, "gray");
            assert_eq!(ceiling, 1_000);
            assert!(estimated_pixels > ceiling);
        }
        other => panic!("expected SourceTooCoarse, got {:?}", other),
    }
    assert_eq!(source.failures(), 0);
    assert_eq!(pipeline.gate().active(), 0);
}

#[tokio::test]
async fn test_lenient_source_renders_over_ceiling() {
    let (bytes, _) = norcal_tiff(5.0, 0);
    let resolver = Arc::new(
        StaticResolver::new()
            .with_source("memory://gray.tif", memory_source("gray.tif", bytes).await),
    );
    let pipeline = build_pipeline(&service_config(4, 100, 1_000), resolver);

    let (z, x, y) = tiles::NORCAL_Z6;
    let outcome = pipeline
        .render_tile("gray_lenient", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap();

    let tile = outcome.into_tile();
    assert_rgba_near!(&tile.pixel(10, 10).unwrap(), [128, 128, 128, 255], 1);
}

/// A single-level 2048x2048 raster over northern California in 16px
/// internal tiles: a z6 tile touches thousands of them.
async fn finely_tiled_gray() -> Arc<StaticResolver> {
    let (min_lon, min_lat, max_lon, max_lat) = test_utils::bbox::NORCAL;
    let bytes = GeoTiffBuilder::new(2048, 2048, vec![5.0; 2048 * 2048])
        .tile_size(16)
        .bbox(min_lon, min_lat, max_lon, max_lat)
        .build();
    Arc::new(
        StaticResolver::new()
            .with_source("memory://gray.tif", memory_source("gray.tif", bytes).await),
    )
}

#[tokio::test]
async fn test_lenient_source_reads_past_tile_cap() {
    let pipeline = build_pipeline(&service_config(4, 100, 1_000), finely_tiled_gray().await);

    let (z, x, y) = tiles::NORCAL_Z6;
    let tile = pipeline
        .render_tile("gray_lenient", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap()
        .into_tile();

    assert_rgba_near!(&tile.pixel(10, 10).unwrap(), [128, 128, 128, 255], 1);
}

#[tokio::test]
async fn test_strict_source_tile_cap_is_not_retried() {
    let pipeline = build_pipeline(&default_config(), finely_tiled_gray().await);

    let (z, x, y) = tiles::NORCAL_Z6;
    let err = pipeline
        .render_tile("gray", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        TileError::ReadFailure { message, .. } => assert!(message.contains("limit is 1024")),
        other => panic!("expected ReadFailure, got {:?}", other),
    }
    assert_eq!(pipeline.gate().active(), 0);
}

#[tokio::test]
async fn test_failed_read_retries_at_coarsest_level() {
    let (bytes, layout) = norcal_tiff(2.0, 2);
    assert_eq!(layout.level_sizes[2], (64, 64));
    let source = poisoned("fuel.tif", bytes, vec![layout.level_data[0].clone()]).await;
    let resolver = Arc::new(StaticResolver::new().with_source("memory://fuel.tif", source.clone()));
    let pipeline = build_pipeline(&header_only(default_config(), &layout), resolver);

    let (z, x, y) = tiles::NORCAL_Z6;
    let tile = pipeline
        .render_tile("fuel", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap()
        .into_tile();

    assert!(source.failures() > 0);
    assert_eq!(tile.pixel(0, 0), Some([173, 221, 142, 255]));
}

#[tokio::test]
async fn test_failed_retry_is_read_failure() {
    let (bytes, layout) = norcal_tiff(2.0, 2);
    let source = poisoned("fuel.tif", bytes, layout.level_data.clone()).await;
    let resolver = Arc::new(StaticResolver::new().with_source("memory://fuel.tif", source));
    let pipeline = build_pipeline(&header_only(default_config(), &layout), resolver);

    let (z, x, y) = tiles::NORCAL_Z6;
    let err = pipeline
        .render_tile("fuel", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TileError::ReadFailure { ref source_name, .. } if source_name == "fuel"));
    assert_eq!(err.http_status_code(), 502);
    assert_eq!(pipeline.gate().active(), 0);
}

#[tokio::test]
async fn test_source_opened_once_across_renders() {
    let (bytes, _) = norcal_tiff(2.0, 1);
    let resolver = Arc::new(
        StaticResolver::new()
            .with_source("memory://fuel.tif", memory_source("fuel.tif", bytes).await),
    );
    let pipeline = build_pipeline(&default_config(), Arc::clone(&resolver));

    let (z, x, y) = tiles::NORCAL_Z6;
    for size in [128, 256, 512] {
        pipeline
            .render_tile("fuel", z, x, y, size, &CancellationToken::new())
            .await
            .unwrap();
    }
    let (z, x, y) = tiles::TEXAS_Z6;
    pipeline
        .render_tile("fuel", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(resolver.resolved(), 1);
    assert_eq!(pipeline.gate().stats().admitted, 4);
}

#[tokio::test]
async fn test_missing_georeference_disables_source() {
    let bytes = GeoTiffBuilder::new(64, 64, vec![1.0; 64 * 64])
        .tile_size(64)
        .without_georef()
        .build();
    let resolver = Arc::new(
        StaticResolver::new()
            .with_source("memory://gray.tif", memory_source("gray.tif", bytes).await),
    );
    let pipeline = build_pipeline(&default_config(), Arc::clone(&resolver));

    let (z, x, y) = tiles::NORCAL_Z6;
    let first = pipeline
        .render_tile("gray", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(first, TileError::MissingGeoreference { .. }));

    let second = pipeline
        .render_tile("gray", z, x, y, 256, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(second, TileError::SourceDisabled("gray".to_string()));
    assert_eq!(resolver.resolved(), 1);
    assert_eq!(pipeline.gate().active(), 0);

    // The lenient entry shares the URL but is a separate source.
    assert!(pipeline.registry().is_disabled("gray"));
    assert!(!pipeline.registry().is_disabled("gray_lenient"));
}

#[tokio::test]
async fn test_request_validation() {
    let pipeline = build_pipeline(&default_config(), Arc::new(StaticResolver::new()));
    let cancel = CancellationToken::new();

    let err = pipeline.render_tile("nope", 6, 10, 24, 256, &cancel).await.unwrap_err();
    assert_eq!(err, TileError::UnknownSource("nope".to_string()));
    assert_eq!(err.http_status_code(), 404);

    // Column 64 does not exist at zoom 6.
    let err = pipeline.render_tile("fuel", 6, 64, 24, 256, &cancel).await.unwrap_err();
    assert!(matches!(err, TileError::InvalidTile { .. }));
    assert_eq!(err.http_status_code(), 400);

    let err = pipeline.render_tile("fuel", 6, 10, 24, 32, &cancel).await.unwrap_err();
    assert!(matches!(err, TileError::InvalidTile { .. }));

    assert_eq!(pipeline.gate().stats().admitted, 0);
}
