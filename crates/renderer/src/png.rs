//! PNG encoding for RGBA tiles.
//!
//! Two modes:
//! - **Indexed (color type 3)** when the tile has at most 256 distinct
//!   RGBA values. Categorical tiles and mostly-transparent edge tiles
//!   nearly always qualify.
//! - **RGBA (color type 6)** otherwise.
//!
//! `create_png_auto` picks between them.

use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;

use crate::error::{Result, StyleError};

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Maximum colors for indexed PNG (PNG8)
const MAX_PALETTE_SIZE: usize = 256;

/// Minimum pixels before palette extraction runs in parallel
const PARALLEL_THRESHOLD: usize = 4096;

type Palette = Vec<[u8; 4]>;

/// Encode RGBA pixels, choosing indexed output when the palette fits.
pub fn create_png_auto(pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    check_dimensions(pixels, width, height, 4)?;

    let extracted = if width * height >= PARALLEL_THRESHOLD {
        extract_palette_parallel(pixels)
    } else {
        extract_palette_sequential(pixels)
    };

    match extracted {
        Some((palette, indices)) => create_png_indexed(width, height, &palette, &indices),
        None => create_png(pixels, width, height),
    }
}

#[inline(always)]
fn pack_color(px: &[u8]) -> u32 {
    u32::from_le_bytes([px[0], px[1], px[2], px[3]])
}

fn extract_palette_sequential(pixels: &[u8]) -> Option<(Palette, Vec<u8>)> {
    let mut lookup: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices = Vec::with_capacity(pixels.len() / 4);

    for px in pixels.chunks_exact(4) {
        let packed = pack_color(px);
        let index = match lookup.get(&packed) {
            Some(&i) => i,
            None => {
                if palette.len() >= MAX_PALETTE_SIZE {
                    return None;
                }
                let i = palette.len() as u8;
                palette.push([px[0], px[1], px[2], px[3]]);
                lookup.insert(packed, i);
                i
            }
        };
        indices.push(index);
    }

    Some((palette, indices))
}

/// Parallel palette extraction: collect distinct colors per chunk, merge,
/// then map pixels to indices in parallel.
fn extract_palette_parallel(pixels: &[u8]) -> Option<(Palette, Vec<u8>)> {
    let chunk_pixels = (pixels.len() / 4 / rayon::current_num_threads()).max(256);

    let distinct: Vec<u32> = pixels
        .par_chunks(chunk_pixels * 4)
        .flat_map_iter(|chunk| {
            let mut local: HashMap<u32, ()> = HashMap::with_capacity(MAX_PALETTE_SIZE);
            for px in chunk.chunks_exact(4) {
                local.insert(pack_color(px), ());
                if local.len() > MAX_PALETTE_SIZE {
                    break;
                }
            }
            local.into_keys()
        })
        .collect();

    let mut lookup: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    for packed in distinct {
        if lookup.contains_key(&packed) {
            continue;
        }
        if palette.len() >= MAX_PALETTE_SIZE {
            return None;
        }
        lookup.insert(packed, palette.len() as u8);
        palette.push(packed.to_le_bytes());
    }

    let mut indices = vec![0u8; pixels.len() / 4];
    indices
        .par_chunks_mut(chunk_pixels)
        .zip(pixels.par_chunks(chunk_pixels * 4))
        .for_each(|(out, chunk)| {
            for (index, px) in out.iter_mut().zip(chunk.chunks_exact(4)) {
                *index = lookup.get(&pack_color(px)).copied().unwrap_or(0);
            }
        });

    Some((palette, indices))
}

/// Indexed PNG (color type 3) from a palette and one index per pixel.
pub fn create_png_indexed(
    width: usize,
    height: usize,
    palette: &[[u8; 4]],
    indices: &[u8],
) -> Result<Vec<u8>> {
    check_dimensions(indices, width, height, 1)?;
    if palette.is_empty() || palette.len() > MAX_PALETTE_SIZE {
        return Err(StyleError::encode(format!(
            "palette must have 1..={} entries, got {}",
            MAX_PALETTE_SIZE,
            palette.len()
        )));
    }

    let mut png = Vec::with_capacity(64 + palette.len() * 4 + indices.len() / 4);
    png.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 3));

    let plte: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
    write_chunk(&mut png, b"PLTE", &plte);

    if palette.iter().any(|c| c[3] < 255) {
        let trns: Vec<u8> = palette.iter().map(|c| c[3]).collect();
        write_chunk(&mut png, b"tRNS", &trns);
    }

    let idat = deflate_scanlines(indices, width, height)?;
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// RGBA PNG (color type 6).
pub fn create_png(pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    check_dimensions(pixels, width, height, 4)?;

    let mut png = Vec::with_capacity(64 + pixels.len() / 4);
    png.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 6));

    let idat = deflate_scanlines(pixels, width * 4, height)?;
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

fn check_dimensions(
    data: &[u8],
    width: usize,
    height: usize,
    bytes_per_pixel: usize,
) -> Result<()> {
    if width == 0 || height == 0 || width > u32::MAX as usize || height > u32::MAX as usize {
        return Err(StyleError::encode(format!(
            "invalid image size {}x{}",
            width, height
        )));
    }
    let expected = width * height * bytes_per_pixel;
    if data.len() != expected {
        return Err(StyleError::encode(format!(
            "buffer has {} bytes, {}x{} image needs {}",
            data.len(),
            width,
            height,
            expected
        )));
    }
    Ok(())
}

fn ihdr(width: usize, height: usize, color_type: u8) -> [u8; 13] {
    let mut data = [0u8; 13];
    data[0..4].copy_from_slice(&(width as u32).to_be_bytes());
    data[4..8].copy_from_slice(&(height as u32).to_be_bytes());
    data[8] = 8; // bit depth
    data[9] = color_type;
    // compression, filter and interlace methods stay 0
    data
}

/// Prefix each row with filter type 0 and zlib-compress.
fn deflate_scanlines(data: &[u8], row_bytes: usize, height: usize) -> Result<Vec<u8>> {
    let mut raw = Vec::with_capacity(height * (row_bytes + 1));
    for row in data.chunks_exact(row_bytes) {
        raw.push(0);
        raw.extend_from_slice(row);
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder
        .write_all(&raw)
        .map_err(|e| StyleError::encode(format!("IDAT compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| StyleError::encode(format!("IDAT compression failed: {}", e)))
}

fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}
