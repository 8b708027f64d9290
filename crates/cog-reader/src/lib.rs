//! Cloud-Optimized GeoTIFF access over byte ranges.
//!
//! This crate opens tiled raster archives without downloading them. It
//! provides:
//!
//! - **Catalog**: the full-resolution image plus its overviews, finest first
//! - **Extent**: the geographic box from the GeoTIFF georeferencing tags
//! - **Level selection**: the cheapest adequate level under a pixel budget
//! - **Windowed reads**: only the internal tiles a window touches are fetched
//!
//! # Architecture
//!
//! ```text
//! Tile request
//!      │
//!      ▼
//! CogSource::open(name, range_source)
//!      │
//!      ├─► Header prefetch (one range request)
//!      │
//!      └─► IFD chain → levels + geotransform + nodata
//!               │
//!               ▼
//! OverviewSelector::select(tile, bbox, levels)
//!      │
//!      ▼
//! CogSource::read_window(level, bbox, w, h)
//!      │
//!      ├─► Load tile offsets for the level (once)
//!      │
//!      ├─► Fetch touched tiles concurrently
//!      │
//!      └─► Nearest-neighbour resample into SampleGrid
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cog_reader::{
//!     CogSource, OverviewSelector, PixelBudget, ReaderConfig, Strictness, WindowRequest,
//! };
//!
//! let source = CogSource::open("slope", range_source, ReaderConfig::default()).await?;
//! let selector = OverviewSelector::new(PixelBudget::default());
//!
//! let choice =
//!     selector.select(&tile_box, &source.bbox(), source.levels(), 256, Strictness::Strict);
//! if let Some(level) = choice.level() {
//!     let grid = source
//!         .read_window(WindowRequest::new(level.index, tile_box, 256, 256))
//!         .await?;
//! }
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod geo;
pub mod overview;
pub mod source;
pub mod tiff;
pub mod types;
pub mod window;

pub use config::ReaderConfig;
pub use error::{CogError, Result};
pub use geo::{GeoKeys, GeoTransform, ModelType};
pub use overview::{LevelChoice, OverviewSelector, PixelEstimate};
pub use source::{CogSource, Tiling};
pub use types::{PixelBudget, ResolutionLevel, RowSpacing, SampleGrid, Strictness};
pub use window::WindowRequest;
