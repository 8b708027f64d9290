//! Shared test utilities for the fire-tiles workspace.
//!
//! This crate provides common testing infrastructure including:
//! - An in-memory GeoTIFF builder with overviews
//! - In-memory and fault-injecting range sources
//! - Sample grid generators
//! - Common test fixtures
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{GeoTiffBuilder, memory_source, fixtures};
//! ```

pub mod fixtures;
pub mod generators;
pub mod geotiff;
pub mod sources;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use geotiff::{GeoTiffBuilder, GeoTiffLayout, Georef, SampleKind};
pub use sources::{memory_source, FailingRangeSource, StaticResolver};

/// Macro for approximate floating-point equality assertions.
///
/// The epsilon defaults to `1e-9` when omitted.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr) => {
        $crate::assert_approx_eq!($left, $right, 1e-9)
    };
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  \
                 diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro for approximate equality of coordinate pairs.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_coords_approx_eq;
///
/// assert_coords_approx_eq!((1.0001, 2.0001), (1.0, 2.0), 0.001);
/// ```
#[macro_export]
macro_rules! assert_coords_approx_eq {
    (($x1:expr, $y1:expr), ($x2:expr, $y2:expr), $epsilon:expr) => {{
        $crate::assert_approx_eq!($x1, $x2, $epsilon);
        $crate::assert_approx_eq!($y1, $y2, $epsilon);
    }};
}

/// Assert that an RGBA pixel matches, with a per-channel tolerance.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_rgba_near;
///
/// assert_rgba_near!(&pixels[0..4], [128, 128, 128, 255], 1);
/// ```
#[macro_export]
macro_rules! assert_rgba_near {
    ($pixel:expr, $expected:expr, $tolerance:expr) => {{
        let pixel: &[u8] = $pixel;
        let expected: [u8; 4] = $expected;
        for (i, (a, b)) in pixel.iter().zip(expected.iter()).enumerate() {
            let diff = (*a as i16 - *b as i16).abs();
            if diff > $tolerance as i16 {
                panic!(
                    "assertion failed: channel {} of {:?} differs from {:?} by {}",
                    i, pixel, expected, diff
                );
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
        assert_approx_eq!(0.25, 0.25);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    fn test_assert_coords_approx_eq_passes() {
        assert_coords_approx_eq!((1.0001, 2.0001), (1.0, 2.0), 0.001);
    }

    #[test]
    fn test_assert_rgba_near_passes() {
        assert_rgba_near!(&[127, 128, 129, 255], [128, 128, 128, 255], 1);
    }

    #[test]
    #[should_panic(expected = "channel 3")]
    fn test_assert_rgba_near_fails() {
        assert_rgba_near!(&[128, 128, 128, 0], [128, 128, 128, 255], 1);
    }
}
