//! TIFF / BigTIFF structure parsing over byte ranges.
//!
//! Only the directory structure lives here: header, IFD chain and tag
//! values. Pixel decoding is in [`crate::decode`].

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use storage::RangeSource;

use crate::error::{CogError, Result};

// Baseline and extension tags
pub const TAG_NEW_SUBFILE_TYPE: u16 = 254;
pub const TAG_IMAGE_WIDTH: u16 = 256;
pub const TAG_IMAGE_LENGTH: u16 = 257;
pub const TAG_BITS_PER_SAMPLE: u16 = 258;
pub const TAG_COMPRESSION: u16 = 259;
pub const TAG_STRIP_OFFSETS: u16 = 273;
pub const TAG_SAMPLES_PER_PIXEL: u16 = 277;
pub const TAG_ROWS_PER_STRIP: u16 = 278;
pub const TAG_STRIP_BYTE_COUNTS: u16 = 279;
pub const TAG_PLANAR_CONFIGURATION: u16 = 284;
pub const TAG_PREDICTOR: u16 = 317;
pub const TAG_TILE_WIDTH: u16 = 322;
pub const TAG_TILE_LENGTH: u16 = 323;
pub const TAG_TILE_OFFSETS: u16 = 324;
pub const TAG_TILE_BYTE_COUNTS: u16 = 325;
pub const TAG_SAMPLE_FORMAT: u16 = 339;

// GeoTIFF tags
pub const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
pub const TAG_MODEL_TIEPOINT: u16 = 33922;
pub const TAG_MODEL_TRANSFORMATION: u16 = 34264;
pub const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
pub const TAG_GDAL_NODATA: u16 = 42113;

/// NewSubfileType bits.
pub const SUBFILE_REDUCED_RESOLUTION: u64 = 0x1;
pub const SUBFILE_MASK: u64 = 0x4;

/// Byte order declared in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub fn u16(self, b: &[u8]) -> u16 {
        let arr = [b[0], b[1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(arr),
            ByteOrder::BigEndian => u16::from_be_bytes(arr),
        }
    }

    pub fn u32(self, b: &[u8]) -> u32 {
        let arr = [b[0], b[1], b[2], b[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(arr),
            ByteOrder::BigEndian => u32::from_be_bytes(arr),
        }
    }

    pub fn u64(self, b: &[u8]) -> u64 {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&b[..8]);
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(arr),
            ByteOrder::BigEndian => u64::from_be_bytes(arr),
        }
    }

    pub fn f32(self, b: &[u8]) -> f32 {
        f32::from_bits(self.u32(b))
    }

    pub fn f64(self, b: &[u8]) -> f64 {
        f64::from_bits(self.u64(b))
    }
}

/// Classic TIFF (32-bit offsets) or BigTIFF (64-bit offsets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffFlavor {
    Classic,
    Big,
}

impl TiffFlavor {
    /// Size of the entry count at the start of an IFD.
    fn count_size(self) -> usize {
        match self {
            TiffFlavor::Classic => 2,
            TiffFlavor::Big => 8,
        }
    }

    /// Size of one directory entry.
    fn entry_size(self) -> usize {
        match self {
            TiffFlavor::Classic => 12,
            TiffFlavor::Big => 20,
        }
    }

    /// Size of an offset field (also the inline value capacity).
    fn offset_size(self) -> usize {
        match self {
            TiffFlavor::Classic => 4,
            TiffFlavor::Big => 8,
        }
    }
}

/// Parsed file header.
#[derive(Debug, Clone, Copy)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub flavor: TiffFlavor,
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse the header from the first bytes of the file.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(CogError::invalid("file shorter than a TIFF header"));
        }

        let byte_order = match &bytes[0..2] {
            b"II" => ByteOrder::LittleEndian,
            b"MM" => ByteOrder::BigEndian,
            _ => return Err(CogError::invalid("missing II/MM byte order mark")),
        };

        match byte_order.u16(&bytes[2..4]) {
            42 => Ok(Self {
                byte_order,
                flavor: TiffFlavor::Classic,
                first_ifd_offset: byte_order.u32(&bytes[4..8]) as u64,
            }),
            43 => {
                if bytes.len() < 16 {
                    return Err(CogError::invalid("truncated BigTIFF header"));
                }
                if byte_order.u16(&bytes[4..6]) != 8 {
                    return Err(CogError::unsupported("BigTIFF offset size other than 8"));
                }
                Ok(Self {
                    byte_order,
                    flavor: TiffFlavor::Big,
                    first_ifd_offset: byte_order.u64(&bytes[8..16]),
                })
            }
            other => Err(CogError::invalid(format!("bad TIFF magic {}", other))),
        }
    }
}

/// TIFF field types, with their element sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    SByte,
    Undefined,
    SShort,
    SLong,
    SRational,
    Float,
    Double,
    Long8,
    SLong8,
    Ifd8,
}

impl FieldType {
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => Self::Byte,
            2 => Self::Ascii,
            3 => Self::Short,
            4 | 13 => Self::Long,
            5 => Self::Rational,
            6 => Self::SByte,
            7 => Self::Undefined,
            8 => Self::SShort,
            9 => Self::SLong,
            10 => Self::SRational,
            11 => Self::Float,
            12 => Self::Double,
            16 | 18 => Self::Long8,
            17 => Self::SLong8,
            _ => return None,
        })
    }

    pub fn size(self) -> usize {
        match self {
            Self::Byte | Self::Ascii | Self::SByte | Self::Undefined => 1,
            Self::Short | Self::SShort => 2,
            Self::Long | Self::SLong | Self::Float => 4,
            Self::Rational
            | Self::SRational
            | Self::Double
            | Self::Long8
            | Self::SLong8
            | Self::Ifd8 => 8,
        }
    }
}

/// One directory entry. The value field is kept raw; it holds either the
/// value itself (when small enough) or the file offset of the value.
#[derive(Debug, Clone, Copy)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: FieldType,
    pub count: u64,
    raw_value: [u8; 8],
}

impl IfdEntry {
    fn byte_len(&self) -> u64 {
        self.count.saturating_mul(self.field_type.size() as u64)
    }
}

/// One image file directory.
#[derive(Debug, Clone)]
pub struct Ifd {
    pub offset: u64,
    pub entries: HashMap<u16, IfdEntry>,
}

impl Ifd {
    pub fn get(&self, tag: u16) -> Option<&IfdEntry> {
        self.entries.get(&tag)
    }

    pub fn has(&self, tag: u16) -> bool {
        self.entries.contains_key(&tag)
    }
}

/// Range reader that serves the header prefetch from memory and goes to
/// the transport for everything else.
#[derive(Debug, Clone)]
pub struct TiffBytes {
    source: Arc<dyn RangeSource>,
    prefix: Bytes,
    pub header: TiffHeader,
}

impl TiffBytes {
    /// Fetch the header prefetch and parse the file header.
    pub async fn open(source: Arc<dyn RangeSource>, prefetch: usize) -> Result<Self> {
        let size = source.size().await?;
        let prefix = source.get_range(0..(prefetch as u64).min(size)).await?;
        let header = TiffHeader::parse(&prefix)?;
        debug!(
            source = source.identifier(),
            prefetched = prefix.len(),
            flavor = ?header.flavor,
            byte_order = ?header.byte_order,
            "Parsed TIFF header"
        );
        Ok(Self {
            source,
            prefix,
            header,
        })
    }

    pub fn source(&self) -> &Arc<dyn RangeSource> {
        &self.source
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Read exactly `len` bytes at `offset`.
    pub async fn read(&self, offset: u64, len: usize) -> Result<Bytes> {
        let end = offset
            .checked_add(len as u64)
            .ok_or_else(|| CogError::invalid("offset overflow"))?;

        if end <= self.prefix.len() as u64 {
            return Ok(self.prefix.slice(offset as usize..end as usize));
        }

        let bytes = self.source.get_range(offset..end).await?;
        if bytes.len() != len {
            return Err(CogError::invalid(format!(
                "truncated read at {}: wanted {} bytes, got {}",
                offset,
                len,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// Parse the IFD at `offset`, returning it and the next IFD offset.
    pub async fn read_ifd(&self, offset: u64) -> Result<(Ifd, u64)> {
        let flavor = self.header.flavor;
        let order = self.header.byte_order;

        let count_bytes = self.read(offset, flavor.count_size()).await?;
        let count = match flavor {
            TiffFlavor::Classic => order.u16(&count_bytes) as u64,
            TiffFlavor::Big => order.u64(&count_bytes),
        };
        if count == 0 || count > 4096 {
            return Err(CogError::invalid(format!(
                "implausible IFD entry count {} at offset {}",
                count, offset
            )));
        }

        let body_len = count as usize * flavor.entry_size() + flavor.offset_size();
        let body = self
            .read(offset + flavor.count_size() as u64, body_len)
            .await?;

        let mut entries = HashMap::with_capacity(count as usize);
        for raw in body.chunks_exact(flavor.entry_size()).take(count as usize) {
            let tag = order.u16(&raw[0..2]);
            let Some(field_type) = FieldType::from_code(order.u16(&raw[2..4])) else {
                // Unknown field types must be skipped, not rejected.
                continue;
            };
            let (count, value) = match flavor {
                TiffFlavor::Classic => (order.u32(&raw[4..8]) as u64, &raw[8..12]),
                TiffFlavor::Big => (order.u64(&raw[4..12]), &raw[12..20]),
            };
            let mut raw_value = [0u8; 8];
            raw_value[..value.len()].copy_from_slice(value);
            entries.insert(
                tag,
                IfdEntry {
                    tag,
                    field_type,
                    count,
                    raw_value,
                },
            );
        }

        let next_raw = &body[body.len() - flavor.offset_size()..];
        let next = match flavor {
            TiffFlavor::Classic => order.u32(next_raw) as u64,
            TiffFlavor::Big => order.u64(next_raw),
        };

        Ok((Ifd { offset, entries }, next))
    }

    /// Walk the IFD chain from the header, stopping at `max_ifds`.
    pub async fn read_ifd_chain(&self, max_ifds: usize) -> Result<Vec<Ifd>> {
        let mut ifds = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut offset = self.header.first_ifd_offset;

        while offset != 0 && ifds.len() < max_ifds {
            if !seen.insert(offset) {
                return Err(CogError::invalid(format!("IFD cycle at offset {}", offset)));
            }
            let (ifd, next) = self.read_ifd(offset).await?;
            ifds.push(ifd);
            offset = next;
        }

        if ifds.is_empty() {
            return Err(CogError::invalid("no image file directories"));
        }
        Ok(ifds)
    }

    /// Raw bytes of a tag value, wherever it lives.
    async fn value_bytes(&self, entry: &IfdEntry) -> Result<Bytes> {
        let len = entry.byte_len();
        let inline_cap = self.header.flavor.offset_size() as u64;

        if len <= inline_cap {
            return Ok(Bytes::copy_from_slice(&entry.raw_value[..len as usize]));
        }

        if len > 256 * 1024 * 1024 {
            return Err(CogError::invalid(format!(
                "tag {} value of {} bytes is implausibly large",
                entry.tag, len
            )));
        }

        let order = self.header.byte_order;
        let offset = match self.header.flavor {
            TiffFlavor::Classic => order.u32(&entry.raw_value[..4]) as u64,
            TiffFlavor::Big => order.u64(&entry.raw_value),
        };
        self.read(offset, len as usize).await
    }

    /// Integer values of a tag (BYTE/SHORT/LONG/LONG8 and signed variants).
    pub async fn read_u64s(&self, entry: &IfdEntry) -> Result<Vec<u64>> {
        let bytes = self.value_bytes(entry).await?;
        let order = self.header.byte_order;
        let size = entry.field_type.size();

        let values = bytes
            .chunks_exact(size)
            .map(|b| match entry.field_type {
                FieldType::Byte | FieldType::Undefined => b[0] as u64,
                FieldType::SByte => b[0] as i8 as i64 as u64,
                FieldType::Short => order.u16(b) as u64,
                FieldType::SShort => order.u16(b) as i16 as i64 as u64,
                FieldType::Long => order.u32(b) as u64,
                FieldType::SLong => order.u32(b) as i32 as i64 as u64,
                _ => order.u64(b),
            })
            .collect();
        Ok(values)
    }

    /// Floating values of a tag (DOUBLE/FLOAT/RATIONAL, integers widened).
    pub async fn read_f64s(&self, entry: &IfdEntry) -> Result<Vec<f64>> {
        let order = self.header.byte_order;
        match entry.field_type {
            FieldType::Double => {
                let bytes = self.value_bytes(entry).await?;
                Ok(bytes.chunks_exact(8).map(|b| order.f64(b)).collect())
            }
            FieldType::Float => {
                let bytes = self.value_bytes(entry).await?;
                Ok(bytes.chunks_exact(4).map(|b| order.f32(b) as f64).collect())
            }
            FieldType::Rational | FieldType::SRational => {
                let bytes = self.value_bytes(entry).await?;
                let signed = entry.field_type == FieldType::SRational;
                Ok(bytes
                    .chunks_exact(8)
                    .map(|b| {
                        let (n, d) = (order.u32(&b[0..4]), order.u32(&b[4..8]));
                        let (n, d) = if signed {
                            (n as i32 as f64, d as i32 as f64)
                        } else {
                            (n as f64, d as f64)
                        };
                        if d == 0.0 {
                            f64::NAN
                        } else {
                            n / d
                        }
                    })
                    .collect())
            }
            _ => Ok(self
                .read_u64s(entry)
                .await?
                .into_iter()
                .map(|v| v as f64)
                .collect()),
        }
    }

    /// ASCII value of a tag with trailing NULs removed.
    pub async fn read_ascii(&self, entry: &IfdEntry) -> Result<String> {
        let bytes = self.value_bytes(entry).await?;
        Ok(String::from_utf8_lossy(&bytes)
            .trim_end_matches('\0')
            .trim()
            .to_string())
    }

    /// First integer value of `tag`, or `default` when absent.
    pub async fn u64_or(&self, ifd: &Ifd, tag: u16, default: u64) -> Result<u64> {
        match ifd.get(tag) {
            Some(entry) => Ok(self
                .read_u64s(entry)
                .await?
                .first()
                .copied()
                .unwrap_or(default)),
            None => Ok(default),
        }
    }

    /// First integer value of a required tag.
    pub async fn required_u64(&self, ifd: &Ifd, tag: u16) -> Result<u64> {
        let entry = ifd
            .get(tag)
            .ok_or_else(|| CogError::invalid(format!("missing required tag {}", tag)))?;
        self.read_u64s(entry)
            .await?
            .first()
            .copied()
            .ok_or_else(|| CogError::invalid(format!("empty required tag {}", tag)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classic_header() {
        let header = TiffHeader::parse(&[b'I', b'I', 42, 0, 8, 0, 0, 0]).unwrap();
        assert_eq!(header.byte_order, ByteOrder::LittleEndian);
        assert_eq!(header.flavor, TiffFlavor::Classic);
        assert_eq!(header.first_ifd_offset, 8);
    }

    #[test]
    fn test_parse_bigtiff_header() {
        let bytes = [b'M', b'M', 0, 43, 0, 8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 16];
        let header = TiffHeader::parse(&bytes).unwrap();
        assert_eq!(header.byte_order, ByteOrder::BigEndian);
        assert_eq!(header.flavor, TiffFlavor::Big);
        assert_eq!(header.first_ifd_offset, 16);
    }

    #[test]
    fn test_reject_non_tiff() {
        assert!(TiffHeader::parse(b"\x89PNG\r\n\x1a\n").is_err());
        assert!(TiffHeader::parse(b"II").is_err());
    }

    #[test]
    fn test_field_sizes() {
        assert_eq!(FieldType::from_code(3).unwrap().size(), 2);
        assert_eq!(FieldType::from_code(12).unwrap().size(), 8);
        assert_eq!(FieldType::from_code(16).unwrap().size(), 8);
        assert!(FieldType::from_code(99).is_none());
    }
}
