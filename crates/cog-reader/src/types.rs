//! Core value types shared by the reader, the selector and the pipeline.

use std::fmt;

/// One entry of a source's resolution pyramid.
///
/// Index 0 is full resolution; higher indices are coarser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionLevel {
    pub index: usize,
    pub width: u64,
    pub height: u64,
}

impl ResolutionLevel {
    pub fn new(index: usize, width: u64, height: u64) -> Self {
        Self {
            index,
            width,
            height,
        }
    }

    /// Total pixel count of the level.
    pub fn pixels(&self) -> u64 {
        self.width.saturating_mul(self.height)
    }
}

impl fmt::Display for ResolutionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{} ({}x{})", self.index, self.width, self.height)
    }
}

/// How a source reacts when even its coarsest level is too expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Abort the tile rather than exceed the hard ceiling.
    #[default]
    Strict,
    /// Always render something, using the coarsest level if needed.
    Lenient,
}

/// Source-pixel budgets for a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBudget {
    /// Preferred maximum source pixels per tile.
    pub soft: u64,
    /// Absolute maximum source pixels per tile.
    pub hard: u64,
}

impl PixelBudget {
    /// Build a budget; the soft limit never exceeds the hard one.
    pub fn new(soft: u64, hard: u64) -> Self {
        Self {
            soft: soft.min(hard),
            hard,
        }
    }
}

impl Default for PixelBudget {
    fn default() -> Self {
        Self::new(4_000_000, 50_000_000)
    }
}

/// Vertical spacing of output rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowSpacing {
    /// Rows evenly spaced in latitude.
    #[default]
    Linear,
    /// Rows evenly spaced in Web Mercator y, as XYZ map tiles are.
    Mercator,
}

/// A resampled grid of samples, row-major from the north-west corner.
///
/// Pixels with no source data (outside the extent or in sparse tiles) are
/// NaN. Values equal to `nodata` are passed through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub nodata: Option<f64>,
}

impl SampleGrid {
    /// A grid filled entirely with NaN.
    pub fn empty(width: usize, height: usize, nodata: Option<f64>) -> Self {
        Self {
            data: vec![f32::NAN; width * height],
            width,
            height,
            nodata,
        }
    }

    /// Sample at column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.width + x).copied()
    }

    /// Number of samples that carry data (not NaN).
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }
}
