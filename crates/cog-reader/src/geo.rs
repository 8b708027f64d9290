//! Georeferencing: pixel ↔ geographic affine mapping from GeoTIFF tags.

use tile_common::GeoBox;

use crate::error::{CogError, Result};

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Model type declared in the GeoKey directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelType {
    Projected,
    Geographic,
    #[default]
    Unknown,
}

/// The subset of the GeoKey directory the reader cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeoKeys {
    pub model_type: ModelType,
    pub pixel_is_point: bool,
    pub epsg: Option<u16>,
}

impl GeoKeys {
    /// Parse a GeoKeyDirectory SHORT array. Only inline values are read.
    pub fn parse(directory: &[u64]) -> Self {
        let mut keys = GeoKeys::default();
        if directory.len() < 4 {
            return keys;
        }

        let count = directory[3] as usize;
        for entry in directory[4..].chunks_exact(4).take(count) {
            let (key, location, value) = (entry[0] as u16, entry[1], entry[3] as u16);
            if location != 0 {
                continue;
            }
            match key {
                KEY_MODEL_TYPE => {
                    keys.model_type = match value {
                        1 => ModelType::Projected,
                        2 => ModelType::Geographic,
                        _ => ModelType::Unknown,
                    }
                }
                KEY_RASTER_TYPE => keys.pixel_is_point = value == RASTER_PIXEL_IS_POINT,
                KEY_GEOGRAPHIC_TYPE | KEY_PROJECTED_CS_TYPE => {
                    if keys.epsg.is_none() || key == KEY_PROJECTED_CS_TYPE {
                        keys.epsg = Some(value);
                    }
                }
                _ => {}
            }
        }
        keys
    }
}

/// North-up affine transform of the full-resolution image:
/// `lon = origin_x + col * pixel_x`, `lat = origin_y + row * pixel_y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_x: f64,
    pub pixel_y: f64,
}

impl GeoTransform {
    /// Build from ModelPixelScale and ModelTiepoint.
    pub fn from_scale_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Result<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return Err(CogError::invalid("short ModelPixelScale or ModelTiepoint"));
        }
        let (sx, sy) = (scale[0], scale[1]);
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);

        Self::checked(Self {
            origin_x: x - i * sx,
            origin_y: y + j * sy,
            pixel_x: sx,
            pixel_y: -sy,
        })
    }

    /// Build from a 4x4 ModelTransformation matrix.
    pub fn from_matrix(matrix: &[f64]) -> Result<Self> {
        if matrix.len() < 16 {
            return Err(CogError::invalid("short ModelTransformation"));
        }
        if matrix[1] != 0.0 || matrix[4] != 0.0 {
            return Err(CogError::unsupported("rotated ModelTransformation"));
        }

        Self::checked(Self {
            origin_x: matrix[3],
            origin_y: matrix[7],
            pixel_x: matrix[0],
            pixel_y: matrix[5],
        })
    }

    fn checked(t: Self) -> Result<Self> {
        let finite = [t.origin_x, t.origin_y, t.pixel_x, t.pixel_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite || t.pixel_x == 0.0 || t.pixel_y == 0.0 {
            return Err(CogError::invalid(format!("degenerate geotransform {:?}", t)));
        }
        Ok(t)
    }

    /// Shift a PixelIsPoint transform to the PixelIsArea convention.
    pub fn to_pixel_is_area(self) -> Self {
        Self {
            origin_x: self.origin_x - self.pixel_x / 2.0,
            origin_y: self.origin_y - self.pixel_y / 2.0,
            ..self
        }
    }

    /// Geographic box covered by a `width` x `height` image.
    pub fn extent(&self, width: u64, height: u64) -> GeoBox {
        let x1 = self.origin_x + width as f64 * self.pixel_x;
        let y1 = self.origin_y + height as f64 * self.pixel_y;
        GeoBox::new(
            self.origin_x.min(x1),
            self.origin_y.min(y1),
            self.origin_x.max(x1),
            self.origin_y.max(y1),
        )
    }

    /// Fractional full-resolution pixel coordinates of a point.
    pub fn to_pixel(&self, lon: f64, lat: f64) -> (f64, f64) {
        (
            (lon - self.origin_x) / self.pixel_x,
            (lat - self.origin_y) / self.pixel_y,
        )
    }
}
