//! Service configuration loaded from the environment.

use std::env;
use std::str::FromStr;

use cog_reader::{PixelBudget, ReaderConfig};
use tile_common::GeoBox;

/// Continental United States; the default enforced extent.
pub const DEFAULT_ENFORCED_EXTENT: GeoBox = GeoBox {
    min_lon: -128.0,
    min_lat: 22.0,
    max_lon: -64.0,
    max_lat: 52.0,
};

/// Smallest and largest accepted `?size=` values.
pub const MIN_TILE_SIZE: u32 = 64;
pub const MAX_TILE_SIZE: u32 = 1024;

/// Tile server configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: String,

    /// Maximum tile jobs past the admission gate at once.
    pub max_concurrent_tiles: usize,

    /// Preferred maximum source pixels decoded per tile.
    pub soft_pixel_budget: u64,

    /// Absolute maximum source pixels for strict sources.
    pub hard_pixel_ceiling: u64,

    /// Deployment-wide clamp applied before any source is touched.
    pub enforced_extent: GeoBox,

    pub default_tile_size: u32,

    /// Base URL of the legend service; `None` uses the built-in legend.
    pub legend_url: Option<String>,

    /// Path to the YAML source list.
    pub sources_config: String,

    pub reader: ReaderConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            max_concurrent_tiles: 8,
            soft_pixel_budget: 4_000_000,
            hard_pixel_ceiling: 50_000_000,
            enforced_extent: DEFAULT_ENFORCED_EXTENT,
            default_tile_size: 256,
            legend_url: None,
            sources_config: "config/sources.yaml".to_string(),
            reader: ReaderConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable variables keep their defaults, except
    /// `ENFORCED_EXTENT`, which must parse when present.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self {
            reader: ReaderConfig::from_env(),
            ..Self::default()
        };

        if let Ok(addr) = env::var("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        parse_var("MAX_CONCURRENT_TILES", &mut config.max_concurrent_tiles);
        parse_var("SOFT_PIXEL_BUDGET", &mut config.soft_pixel_budget);
        parse_var("HARD_PIXEL_CEILING", &mut config.hard_pixel_ceiling);
        parse_var("DEFAULT_TILE_SIZE", &mut config.default_tile_size);

        if let Ok(extent) = env::var("ENFORCED_EXTENT") {
            config.enforced_extent = extent
                .parse()
                .map_err(|e| format!("ENFORCED_EXTENT: {}", e))?;
        }

        config.legend_url = env::var("LEGEND_URL").ok().filter(|u| !u.is_empty());

        if let Ok(path) = env::var("SOURCES_CONFIG") {
            config.sources_config = path;
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_tiles == 0 {
            return Err("max_concurrent_tiles must be > 0".to_string());
        }

        if self.soft_pixel_budget == 0 || self.hard_pixel_ceiling == 0 {
            return Err("pixel budgets must be > 0".to_string());
        }

        if self.soft_pixel_budget > self.hard_pixel_ceiling {
            return Err(format!(
                "soft_pixel_budget ({}) exceeds hard_pixel_ceiling ({})",
                self.soft_pixel_budget, self.hard_pixel_ceiling
            ));
        }

        if self.enforced_extent.is_empty() {
            return Err("enforced_extent is empty".to_string());
        }

        if !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&self.default_tile_size) {
            return Err(format!(
                "default_tile_size must be within {}..={}",
                MIN_TILE_SIZE, MAX_TILE_SIZE
            ));
        }

        self.reader.validate()
    }

    pub fn pixel_budget(&self) -> PixelBudget {
        PixelBudget::new(self.soft_pixel_budget, self.hard_pixel_ceiling)
    }
}

fn parse_var<T: FromStr>(name: &str, slot: &mut T) {
    if let Ok(val) = env::var(name) {
        if let Ok(parsed) = val.parse() {
            *slot = parsed;
        }
    }
}
