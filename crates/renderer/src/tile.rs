//! Rendered RGBA tile buffers.

use crate::error::Result;
use crate::png;

/// A fixed-size RGBA image, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTile {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl RenderedTile {
    /// A square, fully transparent tile.
    pub fn transparent(size: usize) -> Self {
        Self {
            width: size,
            height: size,
            pixels: vec![0; size * size * 4],
        }
    }

    /// RGBA of the pixel at column `x`, row `y`.
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    /// True when every pixel has alpha 0.
    pub fn is_fully_transparent(&self) -> bool {
        self.pixels.chunks_exact(4).all(|p| p[3] == 0)
    }

    /// Encode as PNG, indexed when the tile has at most 256 colors.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        png::create_png_auto(&self.pixels, self.width, self.height)
    }
}
