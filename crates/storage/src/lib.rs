//! Raster archive transport for fire-tiles.
//!
//! Tiled rasters are never downloaded whole: everything above this crate
//! asks for byte ranges. Provides:
//! - The `RangeSource` trait consumed by the COG reader
//! - `ObjectStorage`, a `RangeSource` over HTTP(S), S3, local files, or memory
//! - `RangeResolver`, mapping configured source URLs to range sources

pub mod error;
pub mod object_store;
pub mod range;
pub mod resolver;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig};
pub use error::{StorageError, StorageResult};
pub use range::{RangeSource, RangeStats, RangeStatsSnapshot};
pub use resolver::{ObjectStoreResolver, RangeResolver};
