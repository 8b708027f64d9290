//! Common types shared across the fire-tiles crates: geographic boxes,
//! slippy-tile geometry, and the tile failure taxonomy.

pub mod bbox;
pub mod error;
pub mod tile;

pub use bbox::{BboxParseError, GeoBox};
pub use error::{TileError, TileResult};
pub use tile::{tile_to_geo_box, TileCoord, TileRequest};
