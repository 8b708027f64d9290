//! Resolution-level selection under a source-pixel budget.

use tile_common::GeoBox;
use tracing::debug;

use crate::types::{PixelBudget, ResolutionLevel, Strictness};

/// Outcome of level selection for one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChoice {
    /// The tile does not overlap the source; nothing to decode.
    Empty,
    /// A level within the soft budget.
    Fits {
        level: ResolutionLevel,
        estimated_pixels: u64,
    },
    /// No level fits the soft budget; the coarsest is used anyway.
    FallbackCoarsest {
        level: ResolutionLevel,
        estimated_pixels: u64,
    },
    /// Strict source whose coarsest level exceeds the hard ceiling.
    TooCoarse {
        level: ResolutionLevel,
        estimated_pixels: u64,
        ceiling: u64,
    },
}

impl LevelChoice {
    /// The level to read, if any.
    pub fn level(&self) -> Option<ResolutionLevel> {
        match self {
            LevelChoice::Fits { level, .. } | LevelChoice::FallbackCoarsest { level, .. } => {
                Some(*level)
            }
            LevelChoice::Empty | LevelChoice::TooCoarse { .. } => None,
        }
    }

    pub fn estimated_pixels(&self) -> u64 {
        match self {
            LevelChoice::Empty => 0,
            LevelChoice::Fits {
                estimated_pixels, ..
            }
            | LevelChoice::FallbackCoarsest {
                estimated_pixels, ..
            }
            | LevelChoice::TooCoarse {
                estimated_pixels, ..
            } => *estimated_pixels,
        }
    }
}

/// Source pixels a level needs to cover a tile, along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelEstimate {
    pub width: u64,
    pub height: u64,
}

impl PixelEstimate {
    pub fn pixels(&self) -> u64 {
        self.width.saturating_mul(self.height)
    }
}

/// Picks the cheapest adequate level for a tile.
///
/// Levels are scanned from coarsest to finest. The first level that is
/// both within the soft budget and at least as detailed as the output
/// tile wins. When no level is detailed enough within the budget, the
/// finest level that still fits is used.
#[derive(Debug, Clone, Copy)]
pub struct OverviewSelector {
    budget: PixelBudget,
}

impl OverviewSelector {
    pub fn new(budget: PixelBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> PixelBudget {
        self.budget
    }

    /// Estimate the source pixels `level` needs to cover `tile`.
    ///
    /// The tile is clamped to the source extent; the intersection's share
    /// of the extent is scaled by the level's dimensions. `None` when the
    /// tile misses the source.
    pub fn estimate(
        tile: &GeoBox,
        source_box: &GeoBox,
        level: &ResolutionLevel,
    ) -> Option<PixelEstimate> {
        let overlap = tile.intersection(source_box)?;

        let fx = fraction(overlap.width(), source_box.width());
        let fy = fraction(overlap.height(), source_box.height());

        Some(PixelEstimate {
            width: (fx * level.width as f64).ceil() as u64,
            height: (fy * level.height as f64).ceil() as u64,
        })
    }

    /// Choose a level for a `output_size`-pixel tile.
    ///
    /// `levels` is the catalog in any order; it is scanned by pixel count.
    pub fn select(
        &self,
        tile: &GeoBox,
        source_box: &GeoBox,
        levels: &[ResolutionLevel],
        output_size: u32,
        strictness: Strictness,
    ) -> LevelChoice {
        let mut ordered: Vec<ResolutionLevel> = levels.to_vec();
        ordered.sort_by_key(|l| l.pixels());

        let Some(coarsest) = ordered.first().copied() else {
            return LevelChoice::Empty;
        };

        let Some(coarsest_estimate) = Self::estimate(tile, source_box, &coarsest) else {
            return LevelChoice::Empty;
        };
        if coarsest_estimate.pixels() == 0 {
            return LevelChoice::Empty;
        }

        // Output pixels covering the overlap; a level is adequate when it
        // has at least that many source pixels on each axis.
        let (need_w, need_h) = match tile.intersection(source_box) {
            Some(overlap) => (
                (fraction(overlap.width(), tile.width()) * output_size as f64).ceil() as u64,
                (fraction(overlap.height(), tile.height()) * output_size as f64).ceil() as u64,
            ),
            None => return LevelChoice::Empty,
        };

        let mut best_within_budget = None;
        for level in &ordered {
            let Some(estimate) = Self::estimate(tile, source_box, level) else {
                continue;
            };
            let pixels = estimate.pixels();
            if pixels > self.budget.soft {
                break;
            }
            best_within_budget = Some((*level, pixels));
            if estimate.width >= need_w && estimate.height >= need_h {
                break;
            }
        }

        if let Some((level, estimated_pixels)) = best_within_budget {
            debug!(level = %level, estimated_pixels, "Level within soft budget");
            return LevelChoice::Fits {
                level,
                estimated_pixels,
            };
        }

        let estimated_pixels = coarsest_estimate.pixels();
        if strictness == Strictness::Strict && estimated_pixels > self.budget.hard {
            return LevelChoice::TooCoarse {
                level: coarsest,
                estimated_pixels,
                ceiling: self.budget.hard,
            };
        }

        LevelChoice::FallbackCoarsest {
            level: coarsest,
            estimated_pixels,
        }
    }

    /// The coarsest level as a retry target, unless a strict source would
    /// exceed the hard ceiling with it.
    pub fn retry_level(
        &self,
        tile: &GeoBox,
        source_box: &GeoBox,
        levels: &[ResolutionLevel],
        strictness: Strictness,
    ) -> Option<ResolutionLevel> {
        let coarsest = levels.iter().min_by_key(|l| l.pixels()).copied()?;
        let pixels = Self::estimate(tile, source_box, &coarsest)?.pixels();
        if strictness == Strictness::Strict && pixels > self.budget.hard {
            return None;
        }
        Some(coarsest)
    }
}

fn fraction(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        (part / whole).clamp(0.0, 1.0)
    } else {
        1.0
    }
}
