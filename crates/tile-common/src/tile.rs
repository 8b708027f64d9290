//! Slippy-map (XYZ) tile geometry.
//!
//! Tiles follow the standard Web Mercator quadtree: zoom `z` has `2^z`
//! columns and rows, origin at the top-left (north-west) corner.

use crate::GeoBox;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Highest zoom level accepted for tile requests.
pub const MAX_ZOOM: u32 = 24;

/// Latitude limit of the Web Mercator projection.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along each axis at this zoom.
    pub fn matrix_size(&self) -> u64 {
        1u64 << self.z.min(MAX_ZOOM)
    }

    /// True when the zoom is supported and x/y fall inside the matrix.
    pub fn is_valid(&self) -> bool {
        let n = self.matrix_size();
        self.z <= MAX_ZOOM && (self.x as u64) < n && (self.y as u64) < n
    }

    /// Geographic footprint of this tile.
    pub fn geo_box(&self) -> GeoBox {
        tile_to_geo_box(self.x, self.y, self.z)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Convert Web Mercator tile indices to their lon/lat bounds
/// (spherical Mercator inverse).
pub fn tile_to_geo_box(x: u32, y: u32, z: u32) -> GeoBox {
    let n = (1u64 << z.min(MAX_ZOOM)) as f64;

    let min_lon = x as f64 / n * 360.0 - 180.0;
    let max_lon = (x as f64 + 1.0) / n * 360.0 - 180.0;

    let max_lat = mercator_row_to_lat(y as f64 / n);
    let min_lat = mercator_row_to_lat((y as f64 + 1.0) / n);

    GeoBox::new(min_lon, min_lat, max_lon, max_lat)
}

/// Convert lat/lon to the tile that contains it at `zoom`.
pub fn latlon_to_tile(lat: f64, lon: f64, zoom: u32) -> TileCoord {
    let n = (1u64 << zoom.min(MAX_ZOOM)) as f64;
    let max_index = n - 1.0;

    let x = ((lon + 180.0) / 360.0 * n).floor().clamp(0.0, max_index) as u32;
    let y = (lat_to_mercator_row(lat) * n).floor().clamp(0.0, max_index) as u32;

    TileCoord { z: zoom, x, y }
}

/// Latitude to normalized Mercator row position: 0.0 at the north edge of
/// the projection, 1.0 at the south edge.
pub fn lat_to_mercator_row(lat: f64) -> f64 {
    let lat_rad = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    (1.0 - lat_rad.tan().asinh() / PI) / 2.0
}

/// Inverse of [`lat_to_mercator_row`].
pub fn mercator_row_to_lat(row: f64) -> f64 {
    (PI * (1.0 - 2.0 * row)).sinh().atan().to_degrees()
}

/// A single render request for one tile of one layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRequest {
    pub coord: TileCoord,
    /// Output edge length in pixels (tiles are square).
    pub size: u32,
    /// Deployment-wide hard clamp, independent of any source's extent.
    pub enforced_bounds: GeoBox,
}

impl TileRequest {
    pub fn new(coord: TileCoord, size: u32, enforced_bounds: GeoBox) -> Self {
        Self {
            coord,
            size,
            enforced_bounds,
        }
    }

    /// Geographic footprint of the requested tile.
    pub fn geo_box(&self) -> GeoBox {
        self.coord.geo_box()
    }

    /// True when the tile footprint touches the enforced bounds.
    pub fn within_enforced_bounds(&self) -> bool {
        self.geo_box().intersects(&self.enforced_bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_tile() {
        let bbox = tile_to_geo_box(0, 0, 0);
        assert!((bbox.min_lon + 180.0).abs() < 1e-9);
        assert!((bbox.max_lon - 180.0).abs() < 1e-9);
        assert!((bbox.max_lat - MAX_MERCATOR_LAT).abs() < 1e-6);
        assert!((bbox.min_lat + MAX_MERCATOR_LAT).abs() < 1e-6);
    }

    #[test]
    fn test_tile_roundtrip_contains_point() {
        let coord = latlon_to_tile(39.7, -105.2, 10);
        let bbox = coord.geo_box();
        assert!(bbox.contains_point(-105.2, 39.7));
    }

    #[test]
    fn test_validity() {
        assert!(TileCoord::new(4, 15, 15).is_valid());
        assert!(!TileCoord::new(4, 16, 0).is_valid());
        assert!(!TileCoord::new(MAX_ZOOM + 1, 0, 0).is_valid());
    }
}
