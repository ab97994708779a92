//! Tile addressing, coverage arithmetic and the LRU tile cache.
//!
//! A tile holds up to [`TILE_LINES`] spectrogram rows (time columns on screen) of
//! `fft_size` power bins each, for one `(fft_size, stride)` configuration.

use std::fmt;

use render_protocol::{RenderParams, TileRequest};

mod cache;

pub use cache::{DEFAULT_TILE_CACHE_CAPACITY, TileCache, TileCacheConfig, TileResource};

/// Nominal number of rows per tile.
pub const TILE_LINES: u32 = 256;

/// Raw samples covered by one full tile at `stride`.
pub fn tile_coverage(stride: u32) -> u64 {
    u64::from(TILE_LINES) * u64::from(stride.max(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub sample_start: u64,
    pub fft_size: u32,
    pub stride: u32,
}

impl TileAddress {
    pub fn for_index(tile_index: u64, fft_size: u32, stride: u32) -> Self {
        let stride = stride.max(1);
        Self {
            sample_start: tile_index.saturating_mul(tile_coverage(stride)),
            fft_size,
            stride,
        }
    }

    pub fn tile_index(&self) -> u64 {
        self.sample_start / tile_coverage(self.stride)
    }

    pub fn request(&self) -> TileRequest {
        TileRequest {
            sample_start: self.sample_start,
            fft_size: self.fft_size,
            stride: self.stride,
        }
    }

    /// Rows a source of `total_samples` can fill for this tile: one row per stride
    /// step whose full FFT window lies inside the data, at most [`TILE_LINES`].
    pub fn row_count_for(&self, total_samples: u64) -> u32 {
        let window_end = self.sample_start.saturating_add(u64::from(self.fft_size));
        if window_end > total_samples {
            return 0;
        }
        let rows = (total_samples - window_end) / u64::from(self.stride.max(1)) + 1;
        rows.min(u64::from(TILE_LINES)) as u32
    }
}

impl From<TileAddress> for TileRequest {
    fn from(address: TileAddress) -> Self {
        address.request()
    }
}

impl From<TileRequest> for TileAddress {
    fn from(request: TileRequest) -> Self {
        Self {
            sample_start: request.sample_start,
            fft_size: request.fft_size,
            stride: request.stride,
        }
    }
}

/// Inclusive range of tile indices at one stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpan {
    pub first: u64,
    pub last: u64,
}

impl TileSpan {
    /// Tiles whose nominal span intersects `[scroll_offset_x, scroll_offset_x + width * stride)`.
    pub fn for_window(scroll_offset_x: f64, stride: u32, width: u32) -> Option<Self> {
        if width == 0 || !scroll_offset_x.is_finite() {
            return None;
        }
        let stride = stride.max(1);
        let coverage = tile_coverage(stride) as f64;
        let start = scroll_offset_x.max(0.0);
        let end = start + f64::from(width) * f64::from(stride);

        let first = (start / coverage).floor() as u64;
        let last = ((end / coverage).ceil() as u64).saturating_sub(1);
        (last >= first).then_some(Self { first, last })
    }

    /// Drops tiles that start at or past the end of the data.
    pub fn clamped_to(self, total_samples: u64, stride: u32) -> Option<Self> {
        if total_samples == 0 {
            return None;
        }
        let last_index = (total_samples - 1) / tile_coverage(stride);
        if self.first > last_index {
            return None;
        }
        Some(Self {
            first: self.first,
            last: self.last.min(last_index),
        })
    }

    pub fn tile_count(&self) -> u64 {
        self.last - self.first + 1
    }

    pub fn contains(&self, tile_index: u64) -> bool {
        (self.first..=self.last).contains(&tile_index)
    }

    pub fn addresses(self, fft_size: u32, stride: u32) -> impl Iterator<Item = TileAddress> {
        (self.first..=self.last).map(move |index| TileAddress::for_index(index, fft_size, stride))
    }
}

/// Canonical addresses of every tile the viewport described by `params` can show,
/// in ascending sample order. Tiles starting at or past the end of the data are omitted.
pub fn visible_tiles(params: &RenderParams) -> Vec<TileAddress> {
    let stride = params.stride.max(1);
    TileSpan::for_window(params.scroll_offset_x, stride, params.viewport_width)
        .and_then(|span| span.clamped_to(params.total_samples, stride))
        .map(|span| span.addresses(params.fft_size, stride).collect())
        .unwrap_or_default()
}

/// Decoded row-major `[rows][fft_size]` power values of one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TilePowers {
    fft_size: u32,
    rows: u32,
    values: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileDecodeError {
    ZeroFftSize,
    Empty,
    TooManyRows { rows: usize },
}

impl fmt::Display for TileDecodeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileDecodeError::ZeroFftSize => write!(formatter, "tile fft size is zero"),
            TileDecodeError::Empty => write!(formatter, "tile buffer holds no complete row"),
            TileDecodeError::TooManyRows { rows } => write!(
                formatter,
                "tile buffer holds {rows} rows, more than the {TILE_LINES} allowed"
            ),
        }
    }
}

impl std::error::Error for TileDecodeError {}

impl TilePowers {
    /// A trailing partial row is dropped.
    pub fn decode(mut values: Vec<f32>, fft_size: u32) -> Result<Self, TileDecodeError> {
        if fft_size == 0 {
            return Err(TileDecodeError::ZeroFftSize);
        }
        let row_len = fft_size as usize;
        let rows = values.len() / row_len;
        if rows == 0 {
            return Err(TileDecodeError::Empty);
        }
        if rows > TILE_LINES as usize {
            return Err(TileDecodeError::TooManyRows { rows });
        }
        values.truncate(rows * row_len);
        Ok(Self {
            fft_size,
            rows: rows as u32,
            values,
        })
    }

    pub fn fft_size(&self) -> u32 {
        self.fft_size
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}
