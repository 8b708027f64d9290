//! In-memory GeoTIFF writer for tests.
//!
//! Produces small Cloud-Optimized-style files: every IFD at the front,
//! followed by tile data level by level. Supports tiled or striped
//! layouts, overviews, deflate, both byte orders and optional geotags.

use flate2::write::ZlibEncoder;
use std::io::Write;
use std::ops::Range;

/// Sample encoding written to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    U8,
    I16,
    F32,
}

impl SampleKind {
    fn bits(self) -> u16 {
        match self {
            SampleKind::U8 => 8,
            SampleKind::I16 => 16,
            SampleKind::F32 => 32,
        }
    }

    fn format(self) -> u16 {
        match self {
            SampleKind::U8 => 1,
            SampleKind::I16 => 2,
            SampleKind::F32 => 3,
        }
    }
}

/// How the file is georeferenced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Georef {
    None,
    ScaleTiepoint,
    Transformation,
}

/// Byte layout of a built file.
#[derive(Debug, Clone, Default)]
pub struct GeoTiffLayout {
    /// Tile data byte range of each level, finest first.
    pub level_data: Vec<Range<u64>>,
    /// (width, height) of each level, finest first.
    pub level_sizes: Vec<(u32, u32)>,
    /// End of the IFD block; everything before this is header metadata.
    pub header_len: u64,
}

/// Builder for a synthetic single-band GeoTIFF.
#[derive(Debug, Clone)]
pub struct GeoTiffBuilder {
    width: u32,
    height: u32,
    data: Vec<f32>,
    kind: SampleKind,
    tile_size: u32,
    rows_per_strip: Option<u32>,
    overviews: usize,
    bbox: (f64, f64, f64, f64),
    georef: Georef,
    nodata: Option<String>,
    deflate: bool,
    big_endian: bool,
}

impl GeoTiffBuilder {
    /// Start from row-major `data` of `width` x `height` samples.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), (width * height) as usize, "data size mismatch");
        Self {
            width,
            height,
            data,
            kind: SampleKind::F32,
            tile_size: 16,
            rows_per_strip: None,
            overviews: 0,
            bbox: (-128.0, 22.0, -64.0, 52.0),
            georef: Georef::ScaleTiepoint,
            nodata: None,
            deflate: false,
            big_endian: false,
        }
    }

    pub fn sample_kind(mut self, kind: SampleKind) -> Self {
        self.kind = kind;
        self
    }

    /// Internal tile edge; must be a multiple of 16.
    pub fn tile_size(mut self, size: u32) -> Self {
        self.tile_size = size;
        self
    }

    /// Write strips of `rows` rows instead of tiles.
    pub fn striped(mut self, rows: u32) -> Self {
        self.rows_per_strip = Some(rows);
        self
    }

    /// Add `count` reduced-resolution levels, each half the previous.
    pub fn overviews(mut self, count: usize) -> Self {
        self.overviews = count;
        self
    }

    pub fn bbox(mut self, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        self.bbox = (min_lon, min_lat, max_lon, max_lat);
        self
    }

    pub fn georef(mut self, georef: Georef) -> Self {
        self.georef = georef;
        self
    }

    /// Drop every georeferencing tag.
    pub fn without_georef(self) -> Self {
        self.georef(Georef::None)
    }

    /// GDAL_NODATA tag text.
    pub fn nodata(mut self, value: &str) -> Self {
        self.nodata = Some(value.to_string());
        self
    }

    pub fn deflate(mut self) -> Self {
        self.deflate = true;
        self
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_layout().0
    }

    pub fn build_with_layout(&self) -> (Vec<u8>, GeoTiffLayout) {
        let mut levels = vec![(self.width, self.height, self.data.clone())];
        for k in 1..=self.overviews {
            let step = 1u32 << k;
            let w = self.width.div_ceil(step);
            let h = self.height.div_ceil(step);
            let mut data = Vec::with_capacity((w * h) as usize);
            for y in 0..h {
                for x in 0..w {
                    data.push(self.data[((y * step) * self.width + x * step) as usize]);
                }
            }
            levels.push((w, h, data));
        }

        // Encode every block of every level first so IFD sizes are known.
        let encoded: Vec<Vec<Vec<u8>>> = levels
            .iter()
            .map(|(w, h, data)| self.encode_blocks(*w, *h, data))
            .collect();

        let mut ifds: Vec<Vec<Entry>> = levels
            .iter()
            .enumerate()
            .map(|(i, (w, h, _))| self.entries(i, *w, *h, encoded[i].len()))
            .collect();

        let mut pos = 8u64;
        let mut ifd_offsets = Vec::new();
        for entries in &ifds {
            ifd_offsets.push(pos);
            pos += ifd_size(entries);
        }
        let header_len = pos;

        let mut level_data = Vec::new();
        for (i, blocks) in encoded.iter().enumerate() {
            let start = pos;
            let mut offsets = Vec::new();
            let mut counts = Vec::new();
            for block in blocks {
                offsets.push(pos as u32);
                counts.push(block.len() as u32);
                pos += block.len() as u64;
            }
            level_data.push(start..pos);

            let (offset_tag, count_tag) = if self.rows_per_strip.is_some() {
                (273, 279)
            } else {
                (324, 325)
            };
            for entry in ifds[i].iter_mut() {
                if entry.tag == offset_tag {
                    entry.value = self.longs(&offsets);
                } else if entry.tag == count_tag {
                    entry.value = self.longs(&counts);
                }
            }
        }

        let mut out = Vec::with_capacity(pos as usize);
        out.extend_from_slice(if self.big_endian { b"MM" } else { b"II" });
        out.extend_from_slice(&self.u16(42));
        out.extend_from_slice(&self.u32(8));

        for (i, entries) in ifds.iter().enumerate() {
            let next = ifd_offsets.get(i + 1).copied().unwrap_or(0) as u32;
            self.write_ifd(&mut out, ifd_offsets[i], entries, next);
        }
        assert_eq!(out.len() as u64, header_len);

        for blocks in &encoded {
            for block in blocks {
                out.extend_from_slice(block);
            }
        }

        let layout = GeoTiffLayout {
            level_data,
            level_sizes: levels.iter().map(|(w, h, _)| (*w, *h)).collect(),
            header_len,
        };
        (out, layout)
    }

    fn block_dims(&self, width: u32, height: u32) -> (u32, u32) {
        match self.rows_per_strip {
            Some(rows) => (width, rows.min(height).max(1)),
            None => (self.tile_size, self.tile_size),
        }
    }

    fn encode_blocks(&self, width: u32, height: u32, data: &[f32]) -> Vec<Vec<u8>> {
        let (bw, bh) = self.block_dims(width, height);
        let across = width.div_ceil(bw);
        let down = height.div_ceil(bh);

        let mut blocks = Vec::new();
        for by in 0..down {
            for bx in 0..across {
                let mut raw = Vec::new();
                for y in 0..bh {
                    for x in 0..bw {
                        let (gx, gy) = (bx * bw + x, by * bh + y);
                        let v = if gx < width && gy < height {
                            data[(gy * width + gx) as usize]
                        } else {
                            0.0
                        };
                        raw.extend_from_slice(&self.sample(v));
                    }
                }
                if self.deflate {
                    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                    encoder.write_all(&raw).expect("in-memory write");
                    raw = encoder.finish().expect("in-memory write");
                }
                blocks.push(raw);
            }
        }
        blocks
    }

    fn entries(&self, level: usize, width: u32, height: u32, blocks: usize) -> Vec<Entry> {
        let (bw, bh) = self.block_dims(width, height);
        let mut e = vec![
            Entry::long(254, &[if level == 0 { 0 } else { 1 }], self),
            Entry::long(256, &[width], self),
            Entry::long(257, &[height], self),
            Entry::short(258, &[self.kind.bits()], self),
            Entry::short(259, &[if self.deflate { 8 } else { 1 }], self),
            Entry::short(262, &[1], self),
            Entry::short(277, &[1], self),
            Entry::short(284, &[1], self),
            Entry::short(339, &[self.kind.format()], self),
        ];

        let placeholder = vec![0u32; blocks];
        if self.rows_per_strip.is_some() {
            e.push(Entry::long(273, &placeholder, self));
            e.push(Entry::long(278, &[bh], self));
            e.push(Entry::long(279, &placeholder, self));
        } else {
            e.push(Entry::short(322, &[bw as u16], self));
            e.push(Entry::short(323, &[bh as u16], self));
            e.push(Entry::long(324, &placeholder, self));
            e.push(Entry::long(325, &placeholder, self));
        }

        if level == 0 {
            let (min_lon, min_lat, max_lon, max_lat) = self.bbox;
            let sx = (max_lon - min_lon) / width as f64;
            let sy = (max_lat - min_lat) / height as f64;
            match self.georef {
                Georef::None => {}
                Georef::ScaleTiepoint => {
                    e.push(Entry::double(33550, &[sx, sy, 0.0], self));
                    e.push(Entry::double(33922, &[0.0, 0.0, 0.0, min_lon, max_lat, 0.0], self));
                }
                Georef::Transformation => {
                    let mut m = [0.0; 16];
                    m[0] = sx;
                    m[3] = min_lon;
                    m[5] = -sy;
                    m[7] = max_lat;
                    m[15] = 1.0;
                    e.push(Entry::double(34264, &m, self));
                }
            }
            if self.georef != Georef::None {
                e.push(Entry::short(
                    34735,
                    &[1, 1, 0, 2, 1024, 0, 1, 2, 2048, 0, 1, 4326],
                    self,
                ));
            }
            if let Some(nodata) = &self.nodata {
                let mut text = nodata.as_bytes().to_vec();
                text.push(0);
                e.push(Entry {
                    tag: 42113,
                    field_type: 2,
                    count: text.len() as u32,
                    value: text,
                });
            }
        }

        e.sort_by_key(|entry| entry.tag);
        e
    }

    fn write_ifd(&self, out: &mut Vec<u8>, offset: u64, entries: &[Entry], next: u32) {
        let mut overflow_pos = offset + 2 + entries.len() as u64 * 12 + 4;
        let mut overflow = Vec::new();

        out.extend_from_slice(&self.u16(entries.len() as u16));
        for entry in entries {
            out.extend_from_slice(&self.u16(entry.tag));
            out.extend_from_slice(&self.u16(entry.field_type));
            out.extend_from_slice(&self.u32(entry.count));
            if entry.value.len() <= 4 {
                let mut inline = entry.value.clone();
                inline.resize(4, 0);
                out.extend_from_slice(&inline);
            } else {
                out.extend_from_slice(&self.u32(overflow_pos as u32));
                overflow.extend_from_slice(&entry.value);
                if entry.value.len() % 2 == 1 {
                    overflow.push(0);
                }
                overflow_pos += padded(entry.value.len()) as u64;
            }
        }
        out.extend_from_slice(&self.u32(next));
        out.extend_from_slice(&overflow);
    }

    fn sample(&self, v: f32) -> Vec<u8> {
        match (self.kind, self.big_endian) {
            (SampleKind::U8, _) => vec![v as u8],
            (SampleKind::I16, false) => (v as i16).to_le_bytes().to_vec(),
            (SampleKind::I16, true) => (v as i16).to_be_bytes().to_vec(),
            (SampleKind::F32, false) => v.to_le_bytes().to_vec(),
            (SampleKind::F32, true) => v.to_be_bytes().to_vec(),
        }
    }

    fn u16(&self, v: u16) -> [u8; 2] {
        if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    }

    fn u32(&self, v: u32) -> [u8; 4] {
        if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        }
    }

    fn longs(&self, values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| self.u32(*v)).collect()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    value: Vec<u8>,
}

impl Entry {
    fn short(tag: u16, values: &[u16], b: &GeoTiffBuilder) -> Self {
        Self {
            tag,
            field_type: 3,
            count: values.len() as u32,
            value: values.iter().flat_map(|v| b.u16(*v)).collect(),
        }
    }

    fn long(tag: u16, values: &[u32], b: &GeoTiffBuilder) -> Self {
        Self {
            tag,
            field_type: 4,
            count: values.len() as u32,
            value: b.longs(values),
        }
    }

    fn double(tag: u16, values: &[f64], b: &GeoTiffBuilder) -> Self {
        Self {
            tag,
            field_type: 12,
            count: values.len() as u32,
            value: values
                .iter()
                .flat_map(|v| {
                    if b.big_endian {
                        v.to_be_bytes()
                    } else {
                        v.to_le_bytes()
                    }
                })
                .collect(),
        }
    }
}

fn padded(len: usize) -> usize {
    len + len % 2
}

fn ifd_size(entries: &[Entry]) -> u64 {
    let overflow: usize = entries
        .iter()
        .filter(|e| e.value.len() > 4)
        .map(|e| padded(e.value.len()))
        .sum();
    2 + entries.len() as u64 * 12 + 4 + overflow as u64
}
