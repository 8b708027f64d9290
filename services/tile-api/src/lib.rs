//! XYZ tile service over Cloud-Optimized GeoTIFF sources.
//!
//! Modules:
//! - `config`: environment configuration
//! - `sources`: YAML source list and the registry of opened sources
//! - `gate`: global FIFO admission for tile jobs
//! - `legend`: categorical legends, fetched once and cached
//! - `pipeline`: per-tile orchestration from request to RGBA
//! - `handlers`: axum routes
//! - `metrics`: Prometheus metric names and recorders

pub mod config;
pub mod gate;
pub mod handlers;
pub mod legend;
pub mod metrics;
pub mod pipeline;
pub mod sources;
pub mod state;

pub use config::ServiceConfig;
pub use gate::{ConcurrencyGate, GateCancelled, GatePermit, GateStats};
pub use legend::{HttpLegendFetcher, LegendCache, LegendError, LegendFetcher};
pub use pipeline::{OutOfBounds, RenderOutcome, Stage, TileRenderPipeline};
pub use sources::{ColorMode, SourceConfig, SourceRegistry};
pub use state::AppState;
