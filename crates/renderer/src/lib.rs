//! Tile colorization and PNG encoding.
//!
//! Turns a sampled grid of raster values into an RGBA tile:
//! - Continuous sources use a piecewise-linear [`ColorRamp`]
//! - Categorical sources use a code-to-color [`CategoryTable`]
//! - No-data samples are always transparent ([`NoDataRule`])

pub mod categorical;
pub mod colorize;
pub mod error;
pub mod gradient;
pub mod png;
pub mod style;
pub mod tile;

pub use categorical::{CategoryTable, LegendEntry};
pub use colorize::{Colorizer, NoDataRule};
pub use error::{Result, StyleError};
pub use gradient::ColorRamp;
pub use style::{Color, ColorStop};
pub use tile::RenderedTile;
