//! Continuous color ramps: piecewise-linear interpolation between stops.

use crate::error::{Result, StyleError};
use crate::style::{interpolate_color, Color, ColorStop};

/// A validated, ascending list of (value, color) stops.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    values: Vec<f64>,
    colors: Vec<Color>,
}

impl ColorRamp {
    /// Validate and parse stops. Stops must be non-empty, finite and
    /// ascending (equal neighbours are allowed and produce a hard edge).
    pub fn new(stops: &[ColorStop]) -> Result<Self> {
        if stops.is_empty() {
            return Err(StyleError::EmptyRamp);
        }

        let mut values = Vec::with_capacity(stops.len());
        let mut colors = Vec::with_capacity(stops.len());

        for (index, stop) in stops.iter().enumerate() {
            if !stop.value.is_finite() {
                return Err(StyleError::NonFiniteStop {
                    index,
                    value: stop.value,
                });
            }
            if let Some(&previous) = values.last() {
                if stop.value < previous {
                    return Err(StyleError::UnsortedStops {
                        index,
                        previous,
                        value: stop.value,
                    });
                }
            }
            values.push(stop.value);
            colors.push(Color::from_hex(&stop.color)?);
        }

        Ok(Self { values, colors })
    }

    /// Build from (value, hex) pairs.
    pub fn from_pairs(pairs: &[(f64, &str)]) -> Result<Self> {
        let stops: Vec<ColorStop> = pairs.iter().map(|(v, c)| ColorStop::new(*v, *c)).collect();
        Self::new(&stops)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Color for a sample value.
    ///
    /// Below the first stop clamps to the first color, above the last to
    /// the last color. NaN is transparent.
    pub fn color_at(&self, value: f64) -> Color {
        if value.is_nan() {
            return Color::TRANSPARENT;
        }
        let last = self.values.len() - 1;
        if value <= self.values[0] {
            return self.colors[0];
        }
        if value >= self.values[last] {
            return self.colors[last];
        }

        // First stop strictly above the value; its predecessor is <= value.
        let high = self.values.partition_point(|v| *v <= value);
        let low = high - 1;

        let (v1, v2) = (self.values[low], self.values[high]);
        if v2 == v1 {
            return self.colors[high];
        }
        interpolate_color(self.colors[low], self.colors[high], (value - v1) / (v2 - v1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoint_gray() {
        let ramp = ColorRamp::from_pairs(&[(0.0, "#000000"), (10.0, "#ffffff")]).unwrap();
        assert_eq!(ramp.color_at(5.0), Color::opaque(128, 128, 128));
    }

    #[test]
    fn test_clamps_outside_range() {
        let ramp = ColorRamp::from_pairs(&[(0.0, "#ff0000"), (10.0, "#0000ff")]).unwrap();
        assert_eq!(ramp.color_at(-100.0), Color::opaque(255, 0, 0));
        assert_eq!(ramp.color_at(1e9), Color::opaque(0, 0, 255));
    }

    #[test]
    fn test_non_finite_values() {
        let ramp = ColorRamp::from_pairs(&[(0.0, "#ff0000"), (10.0, "#0000ff")]).unwrap();
        assert_eq!(ramp.color_at(f64::NAN), Color::TRANSPARENT);
        assert_eq!(ramp.color_at(f64::INFINITY), Color::opaque(0, 0, 255));
        assert_eq!(ramp.color_at(f64::NEG_INFINITY), Color::opaque(255, 0, 0));
    }

    #[test]
    fn test_single_stop_is_flat() {
        let ramp = ColorRamp::from_pairs(&[(3.0, "#123456")]).unwrap();
        for v in [-1.0, 3.0, 100.0] {
            assert_eq!(ramp.color_at(v), Color::opaque(0x12, 0x34, 0x56));
        }
    }

    #[test]
    fn test_duplicate_stop_values_do_not_divide_by_zero() {
        let ramp = ColorRamp::from_pairs(&[
            (0.0, "#000000"),
            (5.0, "#ff0000"),
            (5.0, "#00ff00"),
            (10.0, "#0000ff"),
        ])
        .unwrap();
        let c = ramp.color_at(5.0);
        assert_eq!(c.a, 255);
        assert_eq!(ramp.color_at(7.5), Color::opaque(0, 128, 128));
    }

    #[test]
    fn test_exact_stop_hits_stop_color() {
        let ramp = ColorRamp::from_pairs(&[(0.0, "#000000"), (15.0, "#fee08b"), (30.0, "#ffffff")])
            .unwrap();
        assert_eq!(ramp.color_at(15.0), Color::opaque(0xfe, 0xe0, 0x8b));
    }

    #[test]
    fn test_continuous_across_stops() {
        let ramp = ColorRamp::from_pairs(&[
            (0.0, "#1a9850"),
            (15.0, "#fee08b"),
            (30.0, "#f46d43"),
            (60.0, "#a50026"),
        ])
        .unwrap();
        let mut previous = ramp.color_at(0.0);
        let mut v = 0.0;
        while v <= 60.0 {
            let c = ramp.color_at(v);
            for (a, b) in [(c.r, previous.r), (c.g, previous.g), (c.b, previous.b)] {
                assert!((a as i16 - b as i16).abs() <= 3, "jump at {}", v);
            }
            previous = c;
            v += 0.05;
        }
    }

    #[test]
    fn test_validation() {
        assert!(matches!(ColorRamp::new(&[]), Err(StyleError::EmptyRamp)));
        assert!(matches!(
            ColorRamp::from_pairs(&[(1.0, "#000000"), (0.0, "#ffffff")]),
            Err(StyleError::UnsortedStops { index: 1, .. })
        ));
        assert!(matches!(
            ColorRamp::from_pairs(&[(f64::NAN, "#000000")]),
            Err(StyleError::NonFiniteStop { index: 0, .. })
        ));
        assert!(matches!(
            ColorRamp::from_pairs(&[(0.0, "red")]),
            Err(StyleError::InvalidColor(_))
        ));
    }
}
