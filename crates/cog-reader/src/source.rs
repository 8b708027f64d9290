//! Opened Cloud-Optimized GeoTIFF: resolution catalog, extent and
//! internal-tile access.

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use storage::{RangeSource, RangeStatsSnapshot};
use tile_common::GeoBox;

use crate::config::ReaderConfig;
use crate::decode::{Compression, Predictor, SampleType, TileLayout};
use crate::error::{CogError, Result};
use crate::geo::{GeoKeys, GeoTransform, ModelType};
use crate::tiff::*;
use crate::types::ResolutionLevel;

/// Offsets and byte counts of every internal tile of one level.
#[derive(Debug)]
struct TileIndex {
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

/// One image of the pyramid: its IFD plus the decoded layout.
#[derive(Debug)]
struct LevelImage {
    level: ResolutionLevel,
    ifd: Ifd,
    layout: TileLayout,
    tiles_across: u64,
    tiles_down: u64,
    tiled: bool,
    index: OnceCell<TileIndex>,
}

impl LevelImage {
    fn tile_count(&self) -> u64 {
        self.tiles_across * self.tiles_down
    }
}

/// An opened raster archive.
///
/// The catalog, extent and no-data value are fixed at open time. Tile
/// offset tables are loaded per level on first use and then shared, so a
/// handle can be read concurrently by many jobs.
#[derive(Debug)]
pub struct CogSource {
    name: String,
    bytes: TiffBytes,
    images: Vec<LevelImage>,
    levels: Vec<ResolutionLevel>,
    transform: GeoTransform,
    bbox: GeoBox,
    nodata: Option<f64>,
    geo_keys: GeoKeys,
    config: ReaderConfig,
}

impl CogSource {
    /// Open an archive: read the header and every IFD, derive the
    /// resolution catalog and georeferencing. No pixel data is read.
    #[instrument(skip(source, config), fields(source = %name))]
    pub async fn open(
        name: &str,
        source: Arc<dyn RangeSource>,
        config: ReaderConfig,
    ) -> Result<Self> {
        let bytes = TiffBytes::open(source, config.header_prefetch_bytes).await?;
        let ifds = bytes.read_ifd_chain(config.max_ifds).await?;

        let mut primary: Option<Ifd> = None;
        let mut overviews = Vec::new();

        for ifd in ifds {
            let subfile = bytes.u64_or(&ifd, TAG_NEW_SUBFILE_TYPE, 0).await?;
            if subfile & SUBFILE_MASK != 0 {
                debug!(offset = ifd.offset, "Skipping mask IFD");
                continue;
            }
            if subfile & SUBFILE_REDUCED_RESOLUTION != 0 {
                overviews.push(ifd);
            } else if primary.is_none() {
                primary = Some(ifd);
            } else {
                debug!(offset = ifd.offset, "Ignoring additional full-resolution IFD");
            }
        }

        let primary = primary.ok_or_else(|| CogError::invalid("no full-resolution image"))?;

        let mut images = vec![read_level_image(&bytes, primary, 0).await?];
        for ifd in overviews {
            let image = read_level_image(&bytes, ifd, 0).await?;
            images.push(image);
        }
        images[1..].sort_by(|a, b| b.level.width.cmp(&a.level.width));
        for (index, image) in images.iter_mut().enumerate() {
            image.level.index = index;
        }

        let (transform, geo_keys) = read_georeference(&bytes, &images[0].ifd, name).await?;
        if geo_keys.model_type == ModelType::Projected {
            warn!(
                source = name,
                epsg = ?geo_keys.epsg,
                "Projected CRS; coordinates are used as-is without reprojection"
            );
        }

        let nodata = match images[0].ifd.get(TAG_GDAL_NODATA) {
            Some(entry) => {
                let text = bytes.read_ascii(entry).await?;
                let parsed = text.parse::<f64>().ok();
                if parsed.is_none() {
                    warn!(source = name, value = %text, "Unparseable GDAL_NODATA");
                }
                parsed
            }
            None => None,
        };

        let full = images[0].level;
        let bbox = transform.extent(full.width, full.height);
        let levels: Vec<ResolutionLevel> = images.iter().map(|i| i.level).collect();

        info!(
            source = name,
            width = full.width,
            height = full.height,
            levels = levels.len(),
            bbox = %bbox,
            nodata = ?nodata,
            "Opened raster source"
        );

        Ok(Self {
            name: name.to_string(),
            bytes,
            images,
            levels,
            transform,
            bbox,
            nodata,
            geo_keys,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Geographic extent from the embedded georeferencing.
    pub fn bbox(&self) -> GeoBox {
        self.bbox
    }

    /// Resolution catalog, finest first (index 0 is full resolution).
    pub fn levels(&self) -> &[ResolutionLevel] {
        &self.levels
    }

    pub fn coarsest_level(&self) -> ResolutionLevel {
        // Never empty: open fails without a full-resolution image.
        self.levels[self.levels.len() - 1]
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn geo_keys(&self) -> GeoKeys {
        self.geo_keys
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Transfer counters of the underlying transport.
    pub fn stats(&self) -> RangeStatsSnapshot {
        self.bytes.source().stats()
    }

    fn image(&self, level: usize) -> Result<&LevelImage> {
        self.images
            .get(level)
            .ok_or_else(|| CogError::InvalidRequest(format!("no level {}", level)))
    }

    /// Internal tiling of a level.
    pub fn tiling(&self, level: usize) -> Result<Tiling> {
        let image = self.image(level)?;
        Ok(Tiling {
            level: image.level,
            tile_width: image.layout.width as u64,
            tile_height: image.layout.height as u64,
            tiles_across: image.tiles_across,
            tiles_down: image.tiles_down,
        })
    }

    /// Load (once) the tile offset table of a level.
    async fn tile_index<'a>(&'a self, image: &'a LevelImage) -> Result<&'a TileIndex> {
        image
            .index
            .get_or_try_init(|| async {
                let (offset_tag, count_tag) = if image.tiled {
                    (TAG_TILE_OFFSETS, TAG_TILE_BYTE_COUNTS)
                } else {
                    (TAG_STRIP_OFFSETS, TAG_STRIP_BYTE_COUNTS)
                };
                let offsets_entry = image
                    .ifd
                    .get(offset_tag)
                    .ok_or_else(|| CogError::invalid("missing tile offsets"))?;
                let counts_entry = image
                    .ifd
                    .get(count_tag)
                    .ok_or_else(|| CogError::invalid("missing tile byte counts"))?;

                let offsets = self.bytes.read_u64s(offsets_entry).await?;
                let byte_counts = self.bytes.read_u64s(counts_entry).await?;

                // Planar layouts list every band's tiles; band 0 comes first.
                let needed = image.tile_count() as usize;
                if offsets.len() < needed || byte_counts.len() < needed {
                    return Err(CogError::invalid(format!(
                        "level {} has {} tile offsets, expected {}",
                        image.level.index,
                        offsets.len(),
                        needed
                    )));
                }

                debug!(
                    source = %self.name,
                    level = image.level.index,
                    tiles = needed,
                    "Loaded tile index"
                );
                Ok(TileIndex {
                    offsets,
                    byte_counts,
                })
            })
            .await
    }

    /// Fetch and decode one internal tile of a level.
    ///
    /// Returns `None` for sparse tiles (zero offset or byte count), which
    /// carry no data.
    pub async fn read_tile(&self, level: usize, col: u64, row: u64) -> Result<Option<Vec<f32>>> {
        let image = self.image(level)?;
        if col >= image.tiles_across || row >= image.tiles_down {
            return Err(CogError::InvalidRequest(format!(
                "tile {},{} outside level {} grid {}x{}",
                col, row, level, image.tiles_across, image.tiles_down
            )));
        }

        let index = self.tile_index(image).await?;
        let i = (row * image.tiles_across + col) as usize;
        let (offset, len) = (index.offsets[i], index.byte_counts[i]);
        if offset == 0 || len == 0 {
            return Ok(None);
        }

        let compressed = self.bytes.read(offset, len as usize).await?;
        image.layout.decode(&compressed).map(Some)
    }
}

/// Internal tile grid of one level. Strips are full-width tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tiling {
    pub level: ResolutionLevel,
    pub tile_width: u64,
    pub tile_height: u64,
    pub tiles_across: u64,
    pub tiles_down: u64,
}

/// Decode the layout tags of one IFD.
async fn read_level_image(bytes: &TiffBytes, ifd: Ifd, index: usize) -> Result<LevelImage> {
    let width = bytes.required_u64(&ifd, TAG_IMAGE_WIDTH).await?;
    let height = bytes.required_u64(&ifd, TAG_IMAGE_LENGTH).await?;
    if width == 0 || height == 0 {
        return Err(CogError::invalid(format!("empty image {}x{}", width, height)));
    }

    let bits = bytes.u64_or(&ifd, TAG_BITS_PER_SAMPLE, 1).await?;
    let format = bytes.u64_or(&ifd, TAG_SAMPLE_FORMAT, 1).await?;
    let sample_type = SampleType::from_tags(bits, format)?;
    let compression = Compression::from_tag(bytes.u64_or(&ifd, TAG_COMPRESSION, 1).await?)?;
    let predictor = Predictor::from_tag(bytes.u64_or(&ifd, TAG_PREDICTOR, 1).await?)?;
    let planar = bytes.u64_or(&ifd, TAG_PLANAR_CONFIGURATION, 1).await?;
    let samples = bytes.u64_or(&ifd, TAG_SAMPLES_PER_PIXEL, 1).await?.max(1);

    // Separate planes hold one sample per pixel each.
    let samples_per_pixel = if planar == 2 { 1 } else { samples as usize };

    let tiled = ifd.has(TAG_TILE_WIDTH);
    let (tile_width, tile_height) = if tiled {
        (
            bytes.required_u64(&ifd, TAG_TILE_WIDTH).await?,
            bytes.required_u64(&ifd, TAG_TILE_LENGTH).await?,
        )
    } else {
        let rows = bytes.u64_or(&ifd, TAG_ROWS_PER_STRIP, height).await?;
        (width, rows.clamp(1, height))
    };
    if tile_width == 0 || tile_height == 0 {
        return Err(CogError::invalid("zero tile dimensions"));
    }

    Ok(LevelImage {
        level: ResolutionLevel::new(index, width, height),
        layout: TileLayout {
            width: tile_width as usize,
            height: tile_height as usize,
            samples_per_pixel,
            sample_type,
            compression,
            predictor,
            byte_order: bytes.byte_order(),
        },
        tiles_across: width.div_ceil(tile_width),
        tiles_down: height.div_ceil(tile_height),
        tiled,
        ifd,
        index: OnceCell::new(),
    })
}

/// Read the geotransform and GeoKeys of the full-resolution IFD.
async fn read_georeference(
    bytes: &TiffBytes,
    ifd: &Ifd,
    name: &str,
) -> Result<(GeoTransform, GeoKeys)> {
    let geo_keys = match ifd.get(TAG_GEO_KEY_DIRECTORY) {
        Some(entry) => GeoKeys::parse(&bytes.read_u64s(entry).await?),
        None => GeoKeys::default(),
    };

    let transform = match (
        ifd.get(TAG_MODEL_PIXEL_SCALE),
        ifd.get(TAG_MODEL_TIEPOINT),
        ifd.get(TAG_MODEL_TRANSFORMATION),
    ) {
        (Some(scale), Some(tiepoint), _) => GeoTransform::from_scale_tiepoint(
            &bytes.read_f64s(scale).await?,
            &bytes.read_f64s(tiepoint).await?,
        )?,
        (_, _, Some(matrix)) => GeoTransform::from_matrix(&bytes.read_f64s(matrix).await?)?,
        _ => return Err(CogError::MissingGeoreference(name.to_string())),
    };

    let transform = if geo_keys.pixel_is_point {
        transform.to_pixel_is_area()
    } else {
        transform
    };
    Ok((transform, geo_keys))
}
