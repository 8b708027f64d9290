//! Raster source configuration and the registry of opened sources.
//!
//! Sources are declared in a YAML file:
//!
//! ```yaml
//! sources:
//!   - name: slope
//!     url: https://data.example.com/slope_cog.tif
//!     strictness: strict
//!     negative_is_nodata: true
//!     color:
//!       mode: continuous
//!       stops:
//!         - { value: 0, color: "#1a9850" }
//!         - { value: 60, color: "#a50026" }
//!   - name: fuel
//!     url: s3://fire-data/fbfm40_cog.tif
//!     strictness: lenient
//!     color:
//!       mode: categorical
//!       legend: fbfm40
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cog_reader::{CogError, CogSource, ReaderConfig, Strictness};
use renderer::{ColorRamp, ColorStop, NoDataRule};
use storage::{RangeResolver, RangeSource};
use thiserror::Error;
use tile_common::TileError;
use tokio::sync::OnceCell;
use tracing::{error, info, instrument};

use crate::metrics::MeteredSource;

#[derive(Debug, Error)]
pub enum SourceConfigError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid source config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("source '{name}': {message}")]
    Invalid { name: String, message: String },

    #[error("duplicate source name '{0}'")]
    Duplicate(String),
}

/// How a source is colorized.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorMode {
    /// Piecewise-linear ramp, validated at load.
    Continuous(ColorRamp),
    /// Category lookup through the named legend.
    Categorical { legend: String },
}

/// Static configuration of one raster source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    pub strictness: Strictness,
    pub color: ColorMode,
    /// Overrides the file's GDAL_NODATA when set.
    pub nodata: Option<f64>,
    pub negative_is_nodata: bool,
}

impl SourceConfig {
    /// No-data rule for this source, falling back to the file's sentinel.
    pub fn nodata_rule(&self, file_nodata: Option<f64>) -> NoDataRule {
        NoDataRule::new(self.nodata.or(file_nodata), self.negative_is_nodata)
    }
}

// ============================================================================
// YAML Parsing Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct YamlSourcesFile {
    sources: Vec<YamlSource>,
}

#[derive(Debug, Deserialize)]
struct YamlSource {
    name: String,
    url: String,
    #[serde(default)]
    strictness: YamlStrictness,
    #[serde(default)]
    nodata: Option<f64>,
    #[serde(default)]
    negative_is_nodata: bool,
    color: YamlColor,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum YamlStrictness {
    #[default]
    Strict,
    Lenient,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
enum YamlColor {
    Continuous { stops: Vec<ColorStop> },
    Categorical { legend: String },
}

impl YamlSource {
    fn into_config(self) -> Result<SourceConfig, SourceConfigError> {
        if self.name.trim().is_empty() {
            return Err(SourceConfigError::Invalid {
                name: self.name,
                message: "empty name".to_string(),
            });
        }

        let color = match self.color {
            YamlColor::Continuous { stops } => {
                let ramp = ColorRamp::new(&stops).map_err(|e| SourceConfigError::Invalid {
                    name: self.name.clone(),
                    message: e.to_string(),
                })?;
                ColorMode::Continuous(ramp)
            }
            YamlColor::Categorical { legend } => ColorMode::Categorical { legend },
        };

        Ok(SourceConfig {
            name: self.name,
            url: self.url,
            strictness: match self.strictness {
                YamlStrictness::Strict => Strictness::Strict,
                YamlStrictness::Lenient => Strictness::Lenient,
            },
            color,
            nodata: self.nodata,
            negative_is_nodata: self.negative_is_nodata,
        })
    }
}

/// Parse a YAML source list, validating every ramp.
pub fn parse_sources(yaml: &str) -> Result<Vec<SourceConfig>, SourceConfigError> {
    let file: YamlSourcesFile = serde_yaml::from_str(yaml)?;
    let mut seen = std::collections::HashSet::new();
    let mut configs = Vec::with_capacity(file.sources.len());

    for source in file.sources {
        if !seen.insert(source.name.clone()) {
            return Err(SourceConfigError::Duplicate(source.name));
        }
        configs.push(source.into_config()?);
    }
    Ok(configs)
}

/// Load and parse a YAML source list from disk.
pub fn load_sources<P: AsRef<Path>>(path: P) -> Result<Vec<SourceConfig>, SourceConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| SourceConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let configs = parse_sources(&contents)?;
    info!(path = %path.display(), count = configs.len(), "Loaded source config");
    Ok(configs)
}

// ============================================================================
// Registry
// ============================================================================

struct SourceEntry {
    config: Arc<SourceConfig>,
    handle: OnceCell<Arc<CogSource>>,
    disabled: AtomicBool,
}

/// Configured sources and their lazily opened handles.
///
/// A handle is opened once and reused; failed opens are not cached. A
/// source whose file has no georeferencing is disabled for the lifetime of
/// the registry.
pub struct SourceRegistry {
    entries: HashMap<String, SourceEntry>,
    resolver: Arc<dyn RangeResolver>,
    reader: ReaderConfig,
}

impl SourceRegistry {
    pub fn new(
        configs: Vec<SourceConfig>,
        resolver: Arc<dyn RangeResolver>,
        reader: ReaderConfig,
    ) -> Self {
        let entries = configs
            .into_iter()
            .map(|config| {
                (
                    config.name.clone(),
                    SourceEntry {
                        config: Arc::new(config),
                        handle: OnceCell::new(),
                        disabled: AtomicBool::new(false),
                    },
                )
            })
            .collect();

        Self {
            entries,
            resolver,
            reader,
        }
    }

    fn entry(&self, name: &str) -> Result<&SourceEntry, TileError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| TileError::UnknownSource(name.to_string()))?;
        if entry.disabled.load(Ordering::Acquire) {
            return Err(TileError::SourceDisabled(name.to_string()));
        }
        Ok(entry)
    }

    /// Configuration for `name`. Fails for unknown or disabled sources.
    pub fn config(&self, name: &str) -> Result<Arc<SourceConfig>, TileError> {
        Ok(Arc::clone(&self.entry(name)?.config))
    }

    /// The opened handle for `name`, opening it on first use.
    #[instrument(skip(self))]
    pub async fn open(&self, name: &str) -> Result<Arc<CogSource>, TileError> {
        let entry = self.entry(name)?;

        let opened = entry
            .handle
            .get_or_try_init(|| async {
                let range_source = self
                    .resolver
                    .resolve(&entry.config.url)
                    .await
                    .map_err(CogError::from)?;
                let metered: Arc<dyn RangeSource> =
                    Arc::new(MeteredSource::new(name, range_source));
                let source = CogSource::open(name, metered, self.reader.clone()).await?;
                info!(
                    source = name,
                    levels = source.levels().len(),
                    epsg = ?source.geo_keys().epsg,
                    "Opened raster source"
                );
                Ok::<_, CogError>(Arc::new(source))
            })
            .await;

        match opened {
            Ok(source) => Ok(Arc::clone(source)),
            Err(e) if e.is_fatal_for_source() => {
                entry.disabled.store(true, Ordering::Release);
                error!(source = name, error = %e, "Disabling raster source");
                Err(TileError::MissingGeoreference {
                    source_name: name.to_string(),
                })
            }
            Err(e) => Err(TileError::read_failure(name, e.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// True once `name` has an open handle.
    pub fn is_open(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .map(|e| e.handle.initialized())
            .unwrap_or(false)
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .map(|e| e.disabled.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{memory_source, GeoTiffBuilder, StaticResolver};

    const SOURCES_YAML: &str = r##"
sources:
  - name: slope
    url: memory://slope.tif
    negative_is_nodata: true
    color:
      mode: continuous
      stops:
        - { value: 0, color: "#1a9850" }
        - { value: 15, color: "#fee08b" }
        - { value: 60, color: "#a50026" }
  - name: fuel
    url: memory://fuel.tif
    strictness: lenient
    nodata: -9999
    color:
      mode: categorical
      legend: fbfm40
"##;

    #[test]
    fn test_parse_sources() {
        let configs = parse_sources(SOURCES_YAML).unwrap();
        assert_eq!(configs.len(), 2);

        let slope = &configs[0];
        assert_eq!(slope.strictness, Strictness::Strict);
        assert!(slope.negative_is_nodata);
        assert!(matches!(&slope.color, ColorMode::Continuous(ramp) if ramp.len() == 3));

        let fuel = &configs[1];
        assert_eq!(fuel.strictness, Strictness::Lenient);
        assert_eq!(fuel.nodata, Some(-9999.0));
        assert_eq!(
            fuel.color,
            ColorMode::Categorical {
                legend: "fbfm40".to_string()
            }
        );
    }

    #[test]
    fn test_load_sources_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.yaml");
        std::fs::write(&path, SOURCES_YAML).unwrap();

        let configs = load_sources(&path).unwrap();
        assert_eq!(configs.len(), 2);

        let missing = load_sources(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(missing, SourceConfigError::Io { .. }));
    }

    #[test]
    fn test_unsorted_ramp_rejected_at_load() {
        let yaml = r##"
sources:
  - name: bad
    url: memory://bad.tif
    color:
      mode: continuous
      stops:
        - { value: 10, color: "#000000" }
        - { value: 0, color: "#ffffff" }
"##;
        assert!(matches!(
            parse_sources(yaml),
            Err(SourceConfigError::Invalid { name, .. }) if name == "bad"
        ));
    }

    #[test]
    fn test_duplicate_and_unknown_mode_rejected() {
        let dup = r##"
sources:
  - { name: a, url: x, color: { mode: categorical, legend: l } }
  - { name: a, url: y, color: { mode: categorical, legend: l } }
"##;
        assert!(matches!(parse_sources(dup), Err(SourceConfigError::Duplicate(_))));

        let unknown = r##"
sources:
  - { name: a, url: x, color: { mode: hillshade } }
"##;
        assert!(matches!(parse_sources(unknown), Err(SourceConfigError::Yaml(_))));
    }

    #[test]
    fn test_nodata_rule_prefers_config() {
        let configs = parse_sources(SOURCES_YAML).unwrap();
        assert_eq!(configs[1].nodata_rule(Some(0.0)).sentinel, Some(-9999.0));
        assert_eq!(configs[0].nodata_rule(Some(-1.0)).sentinel, Some(-1.0));
    }

    #[tokio::test]
    async fn test_registry_opens_once() {
        let tiff = GeoTiffBuilder::new(32, 32, vec![1.0; 32 * 32]).build();
        let resolver = Arc::new(
            StaticResolver::new()
                .with_source("memory://slope.tif", memory_source("slope.tif", tiff).await),
        );
        let registry = SourceRegistry::new(
            parse_sources(SOURCES_YAML).unwrap(),
            resolver.clone(),
            ReaderConfig::default(),
        );

        assert!(!registry.is_open("slope"));
        let a = registry.open("slope").await.unwrap();
        let b = registry.open("slope").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(resolver.resolved(), 1);
        assert!(registry.is_open("slope"));

        assert_eq!(
            registry.open("nope").await.unwrap_err(),
            TileError::UnknownSource("nope".to_string())
        );
    }

    #[test]
    fn test_open_counts_header_bytes() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (fetched, rendered) = crate::metrics::capture(|| {
            runtime.block_on(async {
                let tiff = GeoTiffBuilder::new(32, 32, vec![1.0; 32 * 32]).build();
                let source = memory_source("slope.tif", tiff).await;
                let resolver =
                    Arc::new(StaticResolver::new().with_source("memory://slope.tif", source));
                let registry = SourceRegistry::new(
                    parse_sources(SOURCES_YAML).unwrap(),
                    resolver,
                    ReaderConfig::default(),
                );
                registry.open("slope").await.unwrap().stats().bytes
            })
        });

        assert!(fetched > 0);
        let line = format!("raster_bytes_fetched_total{{source=\"slope\"}} {}", fetched);
        assert!(rendered.contains(&line), "{}", rendered);
    }

    #[tokio::test]
    async fn test_transient_open_failure_not_cached() {
        // fuel.tif is not registered: resolving fails every time
        let registry = SourceRegistry::new(
            parse_sources(SOURCES_YAML).unwrap(),
            Arc::new(StaticResolver::new()),
            ReaderConfig::default(),
        );
        for _ in 0..2 {
            assert!(matches!(
                registry.open("fuel").await,
                Err(TileError::ReadFailure { .. })
            ));
        }
        assert!(!registry.is_disabled("fuel"));
    }

    #[tokio::test]
    async fn test_missing_georeference_disables_source() {
        let tiff = GeoTiffBuilder::new(16, 16, vec![0.0; 256])
            .without_georef()
            .build();
        let resolver = StaticResolver::new()
            .with_source("memory://slope.tif", memory_source("slope.tif", tiff).await);
        let registry = SourceRegistry::new(
            parse_sources(SOURCES_YAML).unwrap(),
            Arc::new(resolver),
            ReaderConfig::default(),
        );

        assert_eq!(
            registry.open("slope").await.unwrap_err(),
            TileError::MissingGeoreference {
                source_name: "slope".to_string()
            }
        );
        assert!(registry.is_disabled("slope"));
        assert_eq!(
            registry.open("slope").await.unwrap_err(),
            TileError::SourceDisabled("slope".to_string())
        );
        assert!(registry.config("slope").is_err());
    }
}
