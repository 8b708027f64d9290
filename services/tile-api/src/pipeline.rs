//! Per-tile render orchestration.
//!
//! ```text
//!   request
//!      │  enforced extent? ──no──► Transparent (no I/O)
//!      ▼
//!   Admitted        (gate slot held from here)
//!      │  open source, true extent? ──no──► Transparent
//!      ▼
//!   Intersected
//!      │  OverviewSelector ──TooCoarse──► SourceTooCoarse
//!      ▼
//!   LevelChosen
//!      │  read window ──fail──► retry once at coarsest ──fail──► ReadFailure
//!      ▼
//!   Read
//!      │  colorize
//!      ▼
//!   Colorized ─► Done (slot released)
//! ```
//!
//! Every failure is a value for this job only. The one piece of shared
//! state a job can change is the registry's disabled flag for a source
//! whose file lacks georeferencing.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use cog_reader::{
    CogSource, LevelChoice, OverviewSelector, ResolutionLevel, RowSpacing, SampleGrid,
    Strictness, WindowRequest,
};
use renderer::{Colorizer, RenderedTile};
use tile_common::{GeoBox, TileCoord, TileError, TileRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::config::{ServiceConfig, MAX_TILE_SIZE, MIN_TILE_SIZE};
use crate::gate::ConcurrencyGate;
use crate::legend::LegendCache;
use crate::metrics::{self, Outcome};
use crate::sources::{ColorMode, SourceConfig, SourceRegistry};

/// Pipeline stages, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Admitted,
    Intersected,
    LevelChosen,
    Read,
    Colorized,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Admitted => "admitted",
            Stage::Intersected => "intersected",
            Stage::LevelChosen => "level_chosen",
            Stage::Read => "read",
            Stage::Colorized => "colorized",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why a tile rendered fully transparent without decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfBounds {
    /// Tile misses the deployment's enforced extent; nothing was opened.
    EnforcedExtent,
    /// Tile misses the source's georeferenced extent; nothing was decoded.
    SourceExtent,
}

/// Successful result of a tile render.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Rendered(RenderedTile),
    Transparent { size: u32, reason: OutOfBounds },
}

impl RenderOutcome {
    /// The RGBA tile, materializing transparent outcomes.
    pub fn into_tile(self) -> RenderedTile {
        match self {
            RenderOutcome::Rendered(tile) => tile,
            RenderOutcome::Transparent { size, .. } => RenderedTile::transparent(size as usize),
        }
    }

    pub fn is_transparent(&self) -> bool {
        matches!(self, RenderOutcome::Transparent { .. })
    }
}

/// Renders tiles from configured raster sources.
#[derive(Debug)]
pub struct TileRenderPipeline {
    registry: Arc<SourceRegistry>,
    gate: Arc<ConcurrencyGate>,
    legends: Arc<LegendCache>,
    selector: OverviewSelector,
    enforced_extent: GeoBox,
}

impl TileRenderPipeline {
    pub fn new(
        registry: Arc<SourceRegistry>,
        gate: Arc<ConcurrencyGate>,
        legends: Arc<LegendCache>,
        selector: OverviewSelector,
        enforced_extent: GeoBox,
    ) -> Self {
        Self {
            registry,
            gate,
            legends,
            selector,
            enforced_extent,
        }
    }

    /// Build from service configuration.
    pub fn from_config(
        config: &ServiceConfig,
        registry: Arc<SourceRegistry>,
        legends: Arc<LegendCache>,
    ) -> Self {
        Self::new(
            registry,
            Arc::new(ConcurrencyGate::new(config.max_concurrent_tiles)),
            legends,
            OverviewSelector::new(config.pixel_budget()),
            config.enforced_extent,
        )
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn enforced_extent(&self) -> GeoBox {
        self.enforced_extent
    }

    /// Render tile `z/x/y` of `source_name` at `size` x `size` pixels.
    ///
    /// Cancelling `cancel` aborts the job at the gate wait or during the
    /// read; the gate slot is released either way.
    #[instrument(skip(self, cancel), fields(source = source_name))]
    pub async fn render_tile(
        &self,
        source_name: &str,
        z: u32,
        x: u32,
        y: u32,
        size: u32,
        cancel: &CancellationToken,
    ) -> Result<RenderOutcome, TileError> {
        let started = Instant::now();
        let result = self.render(source_name, z, x, y, size, cancel).await;

        match &result {
            Ok(RenderOutcome::Rendered(_)) => {
                metrics::record_tile(Outcome::Rendered, started.elapsed())
            }
            Ok(RenderOutcome::Transparent { .. }) => {
                metrics::record_tile(Outcome::Transparent, started.elapsed())
            }
            Err(e) => {
                metrics::record_tile(Outcome::Failed, started.elapsed());
                metrics::record_error(e.kind());
                debug!(error = %e, "Tile render failed");
            }
        }
        result
    }

    async fn render(
        &self,
        source_name: &str,
        z: u32,
        x: u32,
        y: u32,
        size: u32,
        cancel: &CancellationToken,
    ) -> Result<RenderOutcome, TileError> {
        let coord = TileCoord::new(z, x, y);
        if !coord.is_valid() {
            return Err(TileError::invalid_tile(
                coord.to_string(),
                "column or row outside the zoom level's matrix",
            ));
        }
        if !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&size) {
            return Err(TileError::invalid_tile(
                coord.to_string(),
                format!("size {} outside {}..={}", size, MIN_TILE_SIZE, MAX_TILE_SIZE),
            ));
        }

        let config = self.registry.config(source_name)?;
        let request = TileRequest::new(coord, size, self.enforced_extent);

        if !request.within_enforced_bounds() {
            debug!(tile = %coord, "Tile outside enforced extent");
            return Ok(RenderOutcome::Transparent {
                size,
                reason: OutOfBounds::EnforcedExtent,
            });
        }

        let _permit = self
            .gate
            .acquire_cancellable(cancel)
            .await
            .map_err(|_| TileError::Cancelled)?;
        debug!(stage = %Stage::Admitted, tile = %coord);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TileError::Cancelled),
            result = self.render_admitted(&config, &request) => result,
        }
        // `_permit` drops here on every path
    }

    async fn render_admitted(
        &self,
        config: &SourceConfig,
        request: &TileRequest,
    ) -> Result<RenderOutcome, TileError> {
        let size = request.size;
        let source = self.registry.open(&config.name).await?;
        let tile_box = request.geo_box();

        if !tile_box.intersects(&source.bbox()) {
            debug!(tile = %request.coord, "Tile outside source extent");
            return Ok(RenderOutcome::Transparent {
                size,
                reason: OutOfBounds::SourceExtent,
            });
        }
        debug!(stage = %Stage::Intersected, tile = %request.coord);

        let choice = self.selector.select(
            &tile_box,
            &source.bbox(),
            source.levels(),
            size,
            config.strictness,
        );
        let level = match choice {
            LevelChoice::Empty => {
                return Ok(RenderOutcome::Transparent {
                    size,
                    reason: OutOfBounds::SourceExtent,
                })
            }
            LevelChoice::TooCoarse {
                estimated_pixels,
                ceiling,
                ..
            } => {
                warn!(
                    source = %config.name,
                    tile = %request.coord,
                    estimated_pixels,
                    ceiling,
                    "Coarsest level exceeds hard pixel ceiling"
                );
                return Err(TileError::SourceTooCoarse {
                    source_name: config.name.clone(),
                    estimated_pixels,
                    ceiling,
                });
            }
            LevelChoice::Fits { level, .. } => level,
            LevelChoice::FallbackCoarsest { level, .. } => {
                debug!(level = %level, "No level within soft budget, using coarsest");
                level
            }
        };
        debug!(
            stage = %Stage::LevelChosen,
            level = %level,
            estimated_pixels = choice.estimated_pixels()
        );

        let grid = self.read_with_retry(&source, config, &tile_box, level, size).await?;
        debug!(stage = %Stage::Read, valid = grid.valid_count());

        let colorizer = self.colorizer_for(config).await;
        let rule = config.nodata_rule(source.nodata());
        let tile = colorizer.colorize(&grid.data, grid.width, grid.height, &rule);
        debug!(stage = %Stage::Colorized);

        debug!(stage = %Stage::Done, tile = %request.coord);
        Ok(RenderOutcome::Rendered(tile))
    }

    /// Read at `level`; on failure, retry once at the coarsest level.
    ///
    /// The retry is skipped when it would repeat a read that cannot
    /// succeed: same level, non-transient error.
    async fn read_with_retry(
        &self,
        source: &CogSource,
        config: &SourceConfig,
        tile_box: &GeoBox,
        level: ResolutionLevel,
        size: u32,
    ) -> Result<SampleGrid, TileError> {
        let capped = config.strictness == Strictness::Strict;
        let first = match read_level(source, tile_box, level, size, capped).await {
            Ok(grid) => return Ok(grid),
            Err(e) => e,
        };

        let retry = self
            .selector
            .retry_level(tile_box, &source.bbox(), source.levels(), config.strictness)
            .filter(|coarsest| *coarsest != level || first.is_transient());

        match retry {
            Some(coarsest) => {
                warn!(
                    source = %config.name,
                    level = %level,
                    retry_level = %coarsest,
                    error = %first,
                    "Window read failed, retrying at coarsest level"
                );
                metrics::record_retry(&config.name);
                read_level(source, tile_box, coarsest, size, capped)
                    .await
                    .map_err(|e| TileError::read_failure(&config.name, e.to_string()))
            }
            None => Err(TileError::read_failure(&config.name, first.to_string())),
        }
    }

    async fn colorizer_for(&self, config: &SourceConfig) -> Colorizer {
        match &config.color {
            ColorMode::Continuous(ramp) => Colorizer::Continuous(ramp.clone()),
            ColorMode::Categorical { legend } => {
                Colorizer::Categorical(self.legends.get(legend).await)
            }
        }
    }
}

/// Lenient sources read uncapped: they render at the coarsest level
/// whatever it costs.
async fn read_level(
    source: &CogSource,
    tile_box: &GeoBox,
    level: ResolutionLevel,
    size: u32,
    capped: bool,
) -> cog_reader::Result<SampleGrid> {
    let mut request = WindowRequest::new(level.index, *tile_box, size as usize, size as usize)
        .with_spacing(RowSpacing::Mercator);
    if !capped {
        request = request.uncapped();
    }
    source.read_window(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::LevelChosen.to_string(), "level_chosen");
        assert_eq!(Stage::Done.to_string(), "done");
    }

    #[test]
    fn test_transparent_outcome_materializes() {
        let outcome = RenderOutcome::Transparent {
            size: 64,
            reason: OutOfBounds::EnforcedExtent,
        };
        assert!(outcome.is_transparent());
        let tile = outcome.into_tile();
        assert_eq!((tile.width, tile.height), (64, 64));
        assert!(tile.is_fully_transparent());
    }
}
