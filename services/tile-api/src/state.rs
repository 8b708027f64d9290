//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;

use storage::{ObjectStorageConfig, ObjectStoreResolver, RangeResolver};

use crate::config::ServiceConfig;
use crate::legend::LegendCache;
use crate::pipeline::TileRenderPipeline;
use crate::sources::{load_sources, SourceConfig, SourceRegistry};

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    pub config: ServiceConfig,
    pub pipeline: TileRenderPipeline,
}

impl AppState {
    /// Load sources from `config.sources_config` and wire the pipeline
    /// against object storage.
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        let sources = load_sources(&config.sources_config)
            .with_context(|| format!("loading {}", config.sources_config))?;
        let resolver = Arc::new(ObjectStoreResolver::new(ObjectStorageConfig::from_env()));
        let legends = LegendCache::from_url(config.legend_url.as_deref())?;

        Ok(Self::with_parts(config, sources, resolver, Arc::new(legends)))
    }

    /// Assemble state from already-loaded parts.
    pub fn with_parts(
        config: ServiceConfig,
        sources: Vec<SourceConfig>,
        resolver: Arc<dyn RangeResolver>,
        legends: Arc<LegendCache>,
    ) -> Self {
        let registry = Arc::new(SourceRegistry::new(sources, resolver, config.reader.clone()));
        let pipeline = TileRenderPipeline::from_config(&config, registry, legends);
        Self { config, pipeline }
    }
}
