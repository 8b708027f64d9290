//! HTTP handlers: XYZ tiles, health and metrics.

use axum::{
    body::Body,
    extract::{Extension, Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::sync::Arc;
use tile_common::TileError;
use tokio_util::sync::CancellationToken;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, instrument};

use crate::state::AppState;

/// Build the service router.
pub fn router(state: Arc<AppState>, prometheus: PrometheusHandle) -> Router {
    Router::new()
        .route("/tiles/:source/:z/:x/:y", get(xyz_tile_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(state))
        .layer(Extension(prometheus))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

#[derive(Debug, Default, Deserialize)]
pub struct TileParams {
    /// Output edge length in pixels.
    pub size: Option<u32>,
}

/// GET /tiles/:source/:z/:x/:y[.png]
///
/// Transparent tiles are normal 200 responses. If the client disconnects,
/// axum drops this future; the guard cancels the job and the pipeline
/// releases its gate slot.
#[instrument(skip(state, params))]
pub async fn xyz_tile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((source, z, x, y)): Path<(String, u32, u32, String)>,
    Query(params): Query<TileParams>,
) -> Response {
    let y = match parse_tile_row(&y) {
        Some(y) => y,
        None => {
            return error_response(&TileError::invalid_tile(
                format!("{}/{}/{}", z, x, y),
                "row must be an integer with an optional .png suffix",
            ))
        }
    };
    let size = params.size.unwrap_or(state.config.default_tile_size);

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let result = state
        .pipeline
        .render_tile(&source, z, x, y, size, &cancel)
        .await;
    guard.disarm();

    let tile = match result {
        Ok(outcome) => outcome.into_tile(),
        Err(e) => return error_response(&e),
    };

    match tile.to_png() {
        Ok(png) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "image/png")
            .header(header::CACHE_CONTROL, "public, max-age=3600")
            .body(Body::from(png))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => {
            error!(error = %e, "PNG encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Accepts "12" or "12.png".
fn parse_tile_row(y: &str) -> Option<u32> {
    let (row, ext) = y.rsplit_once('.').unwrap_or((y, "png"));
    if !ext.eq_ignore_ascii_case("png") {
        return None;
    }
    row.parse().ok()
}

fn error_response(e: &TileError) -> Response {
    let status =
        StatusCode::from_u16(e.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %e, kind = e.kind(), "Tile request failed");
    }
    (status, e.to_string()).into_response()
}

/// GET /health - Basic health check
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus metrics endpoint
pub async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(handle.render()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
