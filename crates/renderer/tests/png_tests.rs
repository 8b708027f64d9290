//! Tests for PNG encoding.
//!
//! Output is checked by walking the chunk stream and inflating IDAT, so
//! the tests do not depend on an external PNG decoder.

use std::io::Read;

use renderer::png::{create_png, create_png_auto};
use renderer::RenderedTile;

// ============================================================================
// Helper functions
// ============================================================================

struct Chunk {
    kind: [u8; 4],
    data: Vec<u8>,
}

fn parse_chunks(png: &[u8]) -> Vec<Chunk> {
    assert_eq!(&png[0..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
    let mut chunks = Vec::new();
    let mut pos = 8;
    while pos < png.len() {
        let len = u32::from_be_bytes(png[pos..pos + 4].try_into().unwrap()) as usize;
        let kind: [u8; 4] = png[pos + 4..pos + 8].try_into().unwrap();
        let data = png[pos + 8..pos + 8 + len].to_vec();
        let crc = u32::from_be_bytes(png[pos + 8 + len..pos + 12 + len].try_into().unwrap());
        assert_eq!(crc, crc32fast::hash(&png[pos + 4..pos + 8 + len]), "bad CRC");
        chunks.push(Chunk { kind, data });
        pos += 12 + len;
    }
    chunks
}

fn chunk<'a>(chunks: &'a [Chunk], kind: &[u8; 4]) -> Option<&'a Chunk> {
    chunks.iter().find(|c| &c.kind == kind)
}

fn inflate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    flate2::read::ZlibDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

/// Decode an 8-bit PNG written by this crate back to RGBA.
fn decode_rgba(png: &[u8]) -> (usize, usize, Vec<u8>) {
    let chunks = parse_chunks(png);
    let ihdr = &chunk(&chunks, b"IHDR").unwrap().data;
    let width = u32::from_be_bytes(ihdr[0..4].try_into().unwrap()) as usize;
    let height = u32::from_be_bytes(ihdr[4..8].try_into().unwrap()) as usize;
    let color_type = ihdr[9];
    let raw = inflate(&chunk(&chunks, b"IDAT").unwrap().data);

    let bpp = if color_type == 3 { 1 } else { 4 };
    let mut rgba = Vec::with_capacity(width * height * 4);
    for row in raw.chunks_exact(width * bpp + 1) {
        assert_eq!(row[0], 0, "unexpected filter type");
        if color_type == 6 {
            rgba.extend_from_slice(&row[1..]);
            continue;
        }
        let plte = &chunk(&chunks, b"PLTE").unwrap().data;
        let trns = chunk(&chunks, b"tRNS").map(|c| c.data.clone());
        for &i in &row[1..] {
            let i = i as usize;
            rgba.extend_from_slice(&plte[i * 3..i * 3 + 3]);
            rgba.push(trns.as_ref().map(|t| t[i]).unwrap_or(255));
        }
    }
    (width, height, rgba)
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_transparent_tile_round_trips_as_indexed() {
    let tile = RenderedTile::transparent(256);
    let png = tile.to_png().unwrap();

    let chunks = parse_chunks(&png);
    assert_eq!(chunk(&chunks, b"IHDR").unwrap().data[9], 3);
    assert_eq!(chunk(&chunks, b"tRNS").unwrap().data, vec![0]);

    let (w, h, rgba) = decode_rgba(&png);
    assert_eq!((w, h), (256, 256));
    assert_eq!(rgba, tile.pixels);
}

#[test]
fn test_opaque_palette_has_no_trns() {
    let mut pixels = Vec::new();
    for i in 0..16u8 {
        pixels.extend_from_slice(&[i * 10, 0, 0, 255]);
    }
    let png = create_png_auto(&pixels, 4, 4).unwrap();
    let chunks = parse_chunks(&png);
    assert!(chunk(&chunks, b"tRNS").is_none());
    assert_eq!(chunk(&chunks, b"PLTE").unwrap().data.len(), 16 * 3);
    assert_eq!(decode_rgba(&png).2, pixels);
}

#[test]
fn test_many_colors_fall_back_to_rgba() {
    let (width, height) = (32, 32);
    let mut pixels = Vec::with_capacity(width * height * 4);
    for i in 0..(width * height) as u32 {
        pixels.extend_from_slice(&[(i % 256) as u8, (i / 256) as u8, 7, 200]);
    }

    let png = create_png_auto(&pixels, width, height).unwrap();
    let chunks = parse_chunks(&png);
    assert_eq!(chunk(&chunks, b"IHDR").unwrap().data[9], 6);
    assert!(chunk(&chunks, b"PLTE").is_none());
    assert_eq!(decode_rgba(&png).2, pixels);
}

#[test]
fn test_large_indexed_tile_decodes_exactly() {
    // Large enough for parallel palette extraction
    let (width, height) = (512, 512);
    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            let band = ((x / 32 + y / 32) % 20) as u8;
            let alpha = if x < 16 { 0 } else { 255 };
            pixels.extend_from_slice(&[band * 12, 255 - band * 12, 64, alpha]);
        }
    }

    let png = create_png_auto(&pixels, width, height).unwrap();
    let (_, _, rgba) = decode_rgba(&png);
    assert_eq!(rgba, pixels);

    let rgba_png = create_png(&pixels, width, height).unwrap();
    assert!(png.len() < rgba_png.len());
}

#[test]
fn test_non_square_dimensions() {
    let pixels = vec![255u8; 3 * 2 * 4];
    let png = create_png(&pixels, 3, 2).unwrap();
    let (w, h, rgba) = decode_rgba(&png);
    assert_eq!((w, h), (3, 2));
    assert_eq!(rgba, pixels);
}
