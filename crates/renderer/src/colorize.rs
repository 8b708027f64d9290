//! Sample grids to RGBA.
//!
//! No-data handling runs before either color path: NaN, the source's
//! sentinel value, and (when enabled) negative samples are always fully
//! transparent.

use rayon::prelude::*;
use std::sync::Arc;

use crate::categorical::CategoryTable;
use crate::gradient::ColorRamp;
use crate::style::Color;
use crate::tile::RenderedTile;

/// Which sample values mean "no measurement here".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NoDataRule {
    /// Sentinel value (e.g. GDAL_NODATA, or configured per source).
    pub sentinel: Option<f64>,
    /// Treat every negative sample as no-data.
    pub negative_is_nodata: bool,
}

impl NoDataRule {
    pub fn new(sentinel: Option<f64>, negative_is_nodata: bool) -> Self {
        Self {
            sentinel,
            negative_is_nodata,
        }
    }

    pub fn is_nodata(&self, value: f64) -> bool {
        if value.is_nan() {
            return true;
        }
        if self.negative_is_nodata && value < 0.0 {
            return true;
        }
        matches!(self.sentinel, Some(s) if value == s || (s as f32) as f64 == value)
    }
}

/// Maps samples to color, selected per raster source.
#[derive(Debug, Clone)]
pub enum Colorizer {
    /// Piecewise-linear ramp.
    Continuous(ColorRamp),
    /// Category code lookup; shared with the legend cache.
    Categorical(Arc<CategoryTable>),
}

impl Colorizer {
    /// Color of one sample.
    pub fn color_for(&self, value: f64, nodata: &NoDataRule) -> Color {
        if nodata.is_nodata(value) {
            return Color::TRANSPARENT;
        }
        match self {
            Colorizer::Continuous(ramp) => ramp.color_at(value),
            Colorizer::Categorical(table) => table.color_for(value),
        }
    }

    /// Colorize a row-major grid of `width` x `height` samples.
    pub fn colorize(
        &self,
        samples: &[f32],
        width: usize,
        height: usize,
        nodata: &NoDataRule,
    ) -> RenderedTile {
        let mut pixels = vec![0u8; width * height * 4];
        if width == 0 || height == 0 {
            return RenderedTile {
                width,
                height,
                pixels,
            };
        }

        pixels
            .par_chunks_mut(width * 4)
            .zip(samples.par_chunks(width))
            .for_each(|(out_row, in_row)| {
                for (px, value) in out_row.chunks_exact_mut(4).zip(in_row) {
                    px.copy_from_slice(&self.color_for(*value as f64, nodata).to_array());
                }
            });

        RenderedTile {
            width,
            height,
            pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::assert_rgba_near;

    fn gray() -> Colorizer {
        Colorizer::Continuous(
            ColorRamp::from_pairs(&[(0.0, "#000000"), (10.0, "#ffffff")]).unwrap(),
        )
    }

    fn fuel() -> Colorizer {
        Colorizer::Categorical(Arc::new(
            CategoryTable::from_json(r##"{"2": {"color": "#addd8e"}}"##).unwrap(),
        ))
    }

    #[test]
    fn test_continuous_midpoint() {
        let tile = gray().colorize(&[5.0], 1, 1, &NoDataRule::default());
        assert_rgba_near!(&tile.pixels[0..4], [128, 128, 128, 255], 1);
    }

    #[test]
    fn test_categorical_lookup() {
        let tile = fuel().colorize(&[2.0], 1, 1, &NoDataRule::default());
        assert_eq!(&tile.pixels[..], &[173, 221, 142, 255]);
    }

    #[test]
    fn test_nodata_transparent_for_both_variants() {
        let rule = NoDataRule::new(Some(-9999.0), true);
        let samples = [f32::NAN, -9999.0, -1.0, 2.0];

        for colorizer in [gray(), fuel()] {
            let tile = colorizer.colorize(&samples, 4, 1, &rule);
            assert_eq!(tile.pixel(0, 0).unwrap()[3], 0);
            assert_eq!(tile.pixel(1, 0).unwrap()[3], 0);
            assert_eq!(tile.pixel(2, 0).unwrap()[3], 0);
            assert_eq!(tile.pixel(3, 0).unwrap()[3], 255);
        }
    }

    #[test]
    fn test_negative_allowed_when_not_flagged() {
        let tile = gray().colorize(&[-3.0], 1, 1, &NoDataRule::default());
        assert_eq!(tile.pixel(0, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_sentinel_matches_after_f32_rounding() {
        let rule = NoDataRule::new(Some(3.4e38), false);
        assert!(rule.is_nodata(3.4e38_f32 as f64));
    }

    #[test]
    fn test_multirow_layout() {
        let tile = gray().colorize(&[0.0, 10.0, 10.0, 0.0], 2, 2, &NoDataRule::default());
        assert_eq!(tile.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(tile.pixel(1, 0), Some([255, 255, 255, 255]));
        assert_eq!(tile.pixel(0, 1), Some([255, 255, 255, 255]));
    }
}
