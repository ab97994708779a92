use std::fmt;
use std::future::Future;

/// Parameters the renderer and tile scheduler read for one frame.
///
/// Built fresh from the viewport state on every change; nothing downstream keeps a
/// reference to the viewport itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    /// Fractional sample index of the leftmost visible column.
    pub scroll_offset_x: f64,
    pub fft_size: u32,
    /// Raw samples advanced per rendered column, always at least 1.
    pub stride: u32,
    pub total_samples: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub power_min: f32,
    pub power_max: f32,
    /// Frequency zoom, `1.0` shows every bin.
    pub zoom_y: f32,
    /// Frequency scroll as a fraction of the total bin count.
    pub scroll_offset_y_norm: f32,
}

/// The subset of [`RenderParams`] that changes which tiles are addressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileAddressing {
    pub scroll_offset_x: f64,
    pub fft_size: u32,
    pub stride: u32,
    pub viewport_width: u32,
    pub total_samples: u64,
}

impl RenderParams {
    pub fn addressing(&self) -> TileAddressing {
        TileAddressing {
            scroll_offset_x: self.scroll_offset_x,
            fft_size: self.fft_size,
            stride: self.stride,
            viewport_width: self.viewport_width,
            total_samples: self.total_samples,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRequest {
    pub sample_start: u64,
    pub fft_size: u32,
    pub stride: u32,
}

/// Request for `ceil(length / stride)` complex samples starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleRequest {
    pub start: u64,
    pub length: u64,
    pub stride: u32,
}

impl SampleRequest {
    pub fn expected_sample_count(&self) -> u64 {
        self.length.div_ceil(u64::from(self.stride.max(1)))
    }

    /// Length of the interleaved `[I0, Q0, I1, Q1, ..]` response buffer.
    pub fn expected_buffer_len(&self) -> u64 {
        self.expected_sample_count() * 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Unavailable,
    Failed(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Unavailable => write!(formatter, "data not available"),
            FetchError::Failed(reason) => write!(formatter, "fetch failed: {reason}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// External service producing precomputed tile power rows.
///
/// The response is a dense row-major `[num_rows][fft_size]` buffer of power values.
/// An empty buffer means the tile is not available yet.
pub trait TileSource {
    fn fetch_tile(
        &self,
        request: TileRequest,
    ) -> impl Future<Output = Result<Vec<f32>, FetchError>>;
}

/// External service returning interleaved IQ samples.
pub trait SampleSource {
    fn fetch_samples(
        &self,
        request: SampleRequest,
    ) -> impl Future<Output = Result<Vec<f32>, FetchError>>;
}

impl<T: TileSource + ?Sized> TileSource for &T {
    fn fetch_tile(
        &self,
        request: TileRequest,
    ) -> impl Future<Output = Result<Vec<f32>, FetchError>> {
        (**self).fetch_tile(request)
    }
}

impl<T: SampleSource + ?Sized> SampleSource for &T {
    fn fetch_samples(
        &self,
        request: SampleRequest,
    ) -> impl Future<Output = Result<Vec<f32>, FetchError>> {
        (**self).fetch_samples(request)
    }
}
