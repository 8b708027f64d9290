//! Internal-tile decoding: decompression, predictor reversal and sample
//! conversion to `f32`.

use std::io::Read;

use crate::error::{CogError, Result};
use crate::tiff::ByteOrder;

/// Compression schemes the reader can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lzw,
    Deflate,
}

impl Compression {
    pub fn from_tag(value: u64) -> Result<Self> {
        match value {
            1 => Ok(Self::None),
            5 => Ok(Self::Lzw),
            8 | 32946 => Ok(Self::Deflate),
            other => Err(CogError::unsupported(format!("compression {}", other))),
        }
    }
}

/// TIFF predictor schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    None,
    Horizontal,
    FloatingPoint,
}

impl Predictor {
    pub fn from_tag(value: u64) -> Result<Self> {
        match value {
            1 => Ok(Self::None),
            2 => Ok(Self::Horizontal),
            3 => Ok(Self::FloatingPoint),
            other => Err(CogError::unsupported(format!("predictor {}", other))),
        }
    }
}

/// Numeric type of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Resolve from BitsPerSample and SampleFormat (1 uint, 2 int, 3 float).
    pub fn from_tags(bits: u64, format: u64) -> Result<Self> {
        match (format, bits) {
            (1, 8) => Ok(Self::U8),
            (1, 16) => Ok(Self::U16),
            (1, 32) => Ok(Self::U32),
            (2, 8) => Ok(Self::I8),
            (2, 16) => Ok(Self::I16),
            (2, 32) => Ok(Self::I32),
            (3, 32) => Ok(Self::F32),
            (3, 64) => Ok(Self::F64),
            _ => Err(CogError::unsupported(format!(
                "sample format {} with {} bits",
                format, bits
            ))),
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// Everything needed to turn one compressed tile into samples.
#[derive(Debug, Clone, Copy)]
pub struct TileLayout {
    pub width: usize,
    pub height: usize,
    pub samples_per_pixel: usize,
    pub sample_type: SampleType,
    pub compression: Compression,
    pub predictor: Predictor,
    pub byte_order: ByteOrder,
}

impl TileLayout {
    fn row_bytes(&self) -> usize {
        self.width * self.samples_per_pixel * self.sample_type.bytes()
    }

    fn expected_bytes(&self) -> usize {
        self.row_bytes() * self.height
    }

    /// Decode a compressed tile to the first band as `f32`, row-major.
    pub fn decode(&self, compressed: &[u8]) -> Result<Vec<f32>> {
        let raw = decompress(compressed, self.compression, self.expected_bytes())?;
        let (raw, order) = self.unpredict(raw)?;
        Ok(first_band_to_f32(
            &raw,
            self.sample_type,
            self.samples_per_pixel,
            order,
            self.width * self.height,
        ))
    }

    /// Reverse the predictor. Returns the byte order the output is in,
    /// since the floating-point predictor always produces big-endian.
    fn unpredict(&self, mut data: Vec<u8>) -> Result<(Vec<u8>, ByteOrder)> {
        let row_bytes = self.row_bytes();
        if row_bytes == 0 {
            return Err(CogError::invalid("zero-width tile"));
        }
        let bps = self.sample_type.bytes();
        let spp = self.samples_per_pixel;

        match self.predictor {
            Predictor::None => Ok((data, self.byte_order)),
            Predictor::Horizontal => {
                for row in data.chunks_mut(row_bytes) {
                    horizontal_undiff(row, bps, spp, self.byte_order);
                }
                Ok((data, self.byte_order))
            }
            Predictor::FloatingPoint => {
                let mut out = vec![0u8; data.len()];
                for (src, dst) in data.chunks_mut(row_bytes).zip(out.chunks_mut(row_bytes)) {
                    if src.len() < row_bytes {
                        break;
                    }
                    for i in spp..src.len() {
                        src[i] = src[i].wrapping_add(src[i - spp]);
                    }
                    let count = src.len() / bps;
                    for i in 0..count {
                        for k in 0..bps {
                            dst[i * bps + k] = src[k * count + i];
                        }
                    }
                }
                Ok((out, ByteOrder::BigEndian))
            }
        }
    }
}

/// Decompress and pad/truncate to the expected tile size. Edge tiles are
/// stored at full tile size, so a short buffer means a damaged file, but
/// padding keeps a single bad tile from failing the whole read.
pub fn decompress(compressed: &[u8], compression: Compression, expected: usize) -> Result<Vec<u8>> {
    let mut out = match compression {
        Compression::None => compressed.to_vec(),
        Compression::Deflate => {
            let mut decoder = flate2::read::ZlibDecoder::new(compressed).take(expected as u64);
            let mut out = Vec::with_capacity(expected);
            decoder
                .read_to_end(&mut out)
                .map_err(|e| CogError::decompression(format!("deflate: {}", e)))?;
            out
        }
        Compression::Lzw => {
            let mut decoder =
                weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
            decoder
                .decode(compressed)
                .map_err(|e| CogError::decompression(format!("lzw: {}", e)))?
        }
    };
    out.resize(expected, 0);
    Ok(out)
}

/// Cumulative sum per sample within one row, keeping bands separate.
fn horizontal_undiff(row: &mut [u8], bps: usize, spp: usize, order: ByteOrder) {
    let stride = bps * spp;
    match bps {
        1 => {
            for i in spp..row.len() {
                row[i] = row[i].wrapping_add(row[i - spp]);
            }
        }
        2 => {
            let mut i = stride;
            while i + 2 <= row.len() {
                let prev = order.u16(&row[i - stride..]);
                let sum = order.u16(&row[i..]).wrapping_add(prev);
                let bytes = match order {
                    ByteOrder::LittleEndian => sum.to_le_bytes(),
                    ByteOrder::BigEndian => sum.to_be_bytes(),
                };
                row[i..i + 2].copy_from_slice(&bytes);
                i += 2;
            }
        }
        4 => {
            let mut i = stride;
            while i + 4 <= row.len() {
                let prev = order.u32(&row[i - stride..]);
                let sum = order.u32(&row[i..]).wrapping_add(prev);
                let bytes = match order {
                    ByteOrder::LittleEndian => sum.to_le_bytes(),
                    ByteOrder::BigEndian => sum.to_be_bytes(),
                };
                row[i..i + 4].copy_from_slice(&bytes);
                i += 4;
            }
        }
        _ => {
            let mut i = stride;
            while i + 8 <= row.len() {
                let prev = order.u64(&row[i - stride..]);
                let sum = order.u64(&row[i..]).wrapping_add(prev);
                let bytes = match order {
                    ByteOrder::LittleEndian => sum.to_le_bytes(),
                    ByteOrder::BigEndian => sum.to_be_bytes(),
                };
                row[i..i + 8].copy_from_slice(&bytes);
                i += 8;
            }
        }
    }
}

/// Extract band 0 of `pixels` pixels as `f32`.
fn first_band_to_f32(
    data: &[u8],
    sample_type: SampleType,
    spp: usize,
    order: ByteOrder,
    pixels: usize,
) -> Vec<f32> {
    let bps = sample_type.bytes();
    let stride = bps * spp;

    (0..pixels)
        .map(|i| {
            let b = &data[i * stride..i * stride + bps];
            match sample_type {
                SampleType::U8 => b[0] as f32,
                SampleType::I8 => b[0] as i8 as f32,
                SampleType::U16 => order.u16(b) as f32,
                SampleType::I16 => order.u16(b) as i16 as f32,
                SampleType::U32 => order.u32(b) as f32,
                SampleType::I32 => order.u32(b) as i32 as f32,
                SampleType::F32 => order.f32(b),
                SampleType::F64 => order.f64(b) as f32,
            }
        })
        .collect()
}
