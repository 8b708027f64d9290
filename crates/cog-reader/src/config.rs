//! Configuration for the COG reader.

/// Reader tuning knobs.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Bytes fetched from the start of the file on open. COG writers put
    /// every IFD at the front, so one request usually covers all headers.
    pub header_prefetch_bytes: usize,

    /// Maximum concurrent internal-tile fetches within one window read.
    pub max_tile_fetch_concurrency: usize,

    /// Maximum internal tiles a single window read may touch.
    pub max_tiles_per_read: usize,

    /// Maximum number of IFDs followed in the chain.
    pub max_ifds: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            header_prefetch_bytes: 16 * 1024,
            max_tile_fetch_concurrency: 8,
            max_tiles_per_read: 1024,
            max_ifds: 64,
        }
    }
}

impl ReaderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("HEADER_PREFETCH_BYTES") {
            if let Ok(size) = val.parse() {
                config.header_prefetch_bytes = size;
            }
        }

        if let Ok(val) = std::env::var("MAX_TILE_FETCH_CONCURRENCY") {
            if let Ok(n) = val.parse() {
                config.max_tile_fetch_concurrency = n;
            }
        }

        if let Ok(val) = std::env::var("MAX_TILES_PER_READ") {
            if let Ok(n) = val.parse() {
                config.max_tiles_per_read = n;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.header_prefetch_bytes < 16 {
            return Err("header_prefetch_bytes must be >= 16".to_string());
        }

        if self.max_tile_fetch_concurrency == 0 {
            return Err("max_tile_fetch_concurrency must be > 0".to_string());
        }

        if self.max_tiles_per_read == 0 {
            return Err("max_tiles_per_read must be > 0".to_string());
        }

        Ok(())
    }
}
