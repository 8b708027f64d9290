//! HTTP handler responses.

mod common;

use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{Extension, Path, Query};
use axum::http::{header, StatusCode};
use axum::response::Response;
use test_utils::{memory_source, StaticResolver};
use tile_api::handlers::{xyz_tile_handler, TileParams};
use tile_api::legend::LegendCache;
use tile_api::sources::parse_sources;
use tile_api::AppState;

use common::{default_config, norcal_tiff, FixtureLegends, SOURCES_YAML};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

async fn state() -> Arc<AppState> {
    let (bytes, _) = norcal_tiff(2.0, 1);
    let resolver = Arc::new(
        StaticResolver::new()
            .with_source("memory://fuel.tif", memory_source("fuel.tif", bytes).await),
    );
    Arc::new(AppState::with_parts(
        default_config(),
        parse_sources(SOURCES_YAML).unwrap(),
        resolver,
        Arc::new(LegendCache::new(Arc::new(FixtureLegends))),
    ))
}

async fn get_tile(
    state: Arc<AppState>,
    source: &str,
    z: u32,
    x: u32,
    y: &str,
    size: Option<u32>,
) -> Response {
    xyz_tile_handler(
        Extension(state),
        Path((source.to_string(), z, x, y.to_string())),
        Query(TileParams { size }),
    )
    .await
}

#[tokio::test]
async fn test_tile_returns_png() {
    let response = get_tile(state().await, "fuel", 6, 10, "24.png", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..8], &PNG_SIGNATURE);
}

#[tokio::test]
async fn test_transparent_tile_is_ok() {
    // Arctic Canada, outside the enforced extent.
    let response = get_tile(state().await, "fuel", 4, 2, "3", Some(128)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..8], &PNG_SIGNATURE);
}

#[tokio::test]
async fn test_unknown_source_is_not_found() {
    let response = get_tile(state().await, "nope", 6, 10, "24", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_row_is_bad_request() {
    let state = state().await;

    let response = get_tile(Arc::clone(&state), "fuel", 6, 10, "24.jpg", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get_tile(Arc::clone(&state), "fuel", 6, 10, "999", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get_tile(state, "fuel", 6, 10, "24", Some(4096)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
