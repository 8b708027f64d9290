//! Windowed reads: resample one level over a geographic box into a
//! fixed-size grid, fetching only the internal tiles that are touched.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::{BTreeSet, HashMap};
use tile_common::tile::{lat_to_mercator_row, mercator_row_to_lat};
use tile_common::GeoBox;
use tracing::{debug, instrument};

use crate::error::{CogError, Result};
use crate::source::CogSource;
use crate::types::{RowSpacing, SampleGrid};

/// Parameters of one window read.
#[derive(Debug, Clone, Copy)]
pub struct WindowRequest {
    pub level: usize,
    pub geo_box: GeoBox,
    pub width: usize,
    pub height: usize,
    pub spacing: RowSpacing,
    /// Apply the reader's `max_tiles_per_read` cap.
    pub capped: bool,
}

impl WindowRequest {
    pub fn new(level: usize, geo_box: GeoBox, width: usize, height: usize) -> Self {
        Self {
            level,
            geo_box,
            width,
            height,
            spacing: RowSpacing::Linear,
            capped: true,
        }
    }

    pub fn with_spacing(mut self, spacing: RowSpacing) -> Self {
        self.spacing = spacing;
        self
    }

    /// Read every touched tile, however many.
    pub fn uncapped(mut self) -> Self {
        self.capped = false;
        self
    }

    /// Longitude of each output column center.
    fn column_lons(&self) -> Vec<f64> {
        let b = &self.geo_box;
        (0..self.width)
            .map(|x| b.min_lon + (x as f64 + 0.5) / self.width as f64 * b.width())
            .collect()
    }

    /// Latitude of each output row center, north to south.
    fn row_lats(&self) -> Vec<f64> {
        let b = &self.geo_box;
        match self.spacing {
            RowSpacing::Linear => (0..self.height)
                .map(|y| b.max_lat - (y as f64 + 0.5) / self.height as f64 * b.height())
                .collect(),
            RowSpacing::Mercator => {
                let top = lat_to_mercator_row(b.max_lat);
                let bottom = lat_to_mercator_row(b.min_lat);
                (0..self.height)
                    .map(|y| {
                        mercator_row_to_lat(
                            top + (y as f64 + 0.5) / self.height as f64 * (bottom - top),
                        )
                    })
                    .collect()
            }
        }
    }
}

impl CogSource {
    /// Read `request.width` x `request.height` samples over `request.geo_box`
    /// from one level, nearest-neighbour.
    ///
    /// Output pixels outside the source extent, or in sparse tiles, are NaN.
    #[instrument(skip(self), fields(source = %self.name(), level = request.level))]
    pub async fn read_window(&self, request: WindowRequest) -> Result<SampleGrid> {
        if request.width == 0 || request.height == 0 {
            return Err(CogError::InvalidRequest("empty output grid".to_string()));
        }
        if request.geo_box.is_empty() {
            return Err(CogError::InvalidRequest("empty window".to_string()));
        }

        let tiling = self.tiling(request.level)?;
        let full = self.levels()[0];
        let transform = *self.transform();

        // Full-resolution pixels per level pixel along each axis.
        let ratio_x = full.width as f64 / tiling.level.width as f64;
        let ratio_y = full.height as f64 / tiling.level.height as f64;

        let cols: Vec<Option<u64>> = request
            .column_lons()
            .into_iter()
            .map(|lon| {
                let (px, _) = transform.to_pixel(lon, transform.origin_y);
                level_index(px / ratio_x, tiling.level.width)
            })
            .collect();
        let rows: Vec<Option<u64>> = request
            .row_lats()
            .into_iter()
            .map(|lat| {
                let (_, py) = transform.to_pixel(transform.origin_x, lat);
                level_index(py / ratio_y, tiling.level.height)
            })
            .collect();

        let mut grid = SampleGrid::empty(request.width, request.height, self.nodata());

        let tile_cols: BTreeSet<u64> =
            cols.iter().flatten().map(|c| c / tiling.tile_width).collect();
        let tile_rows: BTreeSet<u64> =
            rows.iter().flatten().map(|r| r / tiling.tile_height).collect();
        let needed: Vec<(u64, u64)> = tile_rows
            .iter()
            .flat_map(|r| tile_cols.iter().map(move |c| (*c, *r)))
            .collect();

        if needed.is_empty() {
            return Ok(grid);
        }
        let limit = self.config().max_tiles_per_read;
        if request.capped && needed.len() > limit {
            return Err(CogError::TileLimit {
                touched: needed.len(),
                limit,
            });
        }

        debug!(tiles = needed.len(), "Fetching internal tiles");

        let level = request.level;
        let tiles: HashMap<(u64, u64), Option<Vec<f32>>> = stream::iter(needed)
            .map(|(c, r)| async move {
                let data = self.read_tile(level, c, r).await?;
                Ok::<_, CogError>(((c, r), data))
            })
            .buffer_unordered(self.config().max_tile_fetch_concurrency.max(1))
            .try_collect()
            .await?;

        let tile_w = tiling.tile_width as usize;
        for (y, row) in rows.iter().enumerate() {
            let Some(row) = row else { continue };
            let (tr, in_r) = (row / tiling.tile_height, (row % tiling.tile_height) as usize);

            for (x, col) in cols.iter().enumerate() {
                let Some(col) = col else { continue };
                let (tc, in_c) = (col / tiling.tile_width, (col % tiling.tile_width) as usize);

                if let Some(Some(tile)) = tiles.get(&(tc, tr)) {
                    if let Some(v) = tile.get(in_r * tile_w + in_c) {
                        grid.data[y * request.width + x] = *v;
                    }
                }
            }
        }

        Ok(grid)
    }
}

/// Floor a fractional level pixel coordinate, or `None` outside `0..size`.
fn level_index(pos: f64, size: u64) -> Option<u64> {
    if !pos.is_finite() || pos < 0.0 {
        return None;
    }
    let i = pos.floor() as u64;
    (i < size).then_some(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_index_bounds() {
        assert_eq!(level_index(-0.1, 10), None);
        assert_eq!(level_index(0.0, 10), Some(0));
        assert_eq!(level_index(9.99, 10), Some(9));
        assert_eq!(level_index(10.0, 10), None);
        assert_eq!(level_index(f64::NAN, 10), None);
    }

    #[test]
    fn test_linear_rows_north_to_south() {
        let request = WindowRequest::new(0, GeoBox::new(0.0, 0.0, 4.0, 4.0), 4, 4);
        assert_eq!(request.row_lats(), vec![3.5, 2.5, 1.5, 0.5]);
        assert_eq!(request.column_lons(), vec![0.5, 1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_mercator_rows_denser_south() {
        let request = WindowRequest::new(0, GeoBox::new(0.0, 0.0, 10.0, 60.0), 1, 4)
            .with_spacing(RowSpacing::Mercator);
        let lats = request.row_lats();
        assert!(lats.windows(2).all(|w| w[0] > w[1]));
        // Mercator stretches high latitudes, so row centers sit north of linear ones.
        assert!(lats[1] > 37.5);
    }
}
