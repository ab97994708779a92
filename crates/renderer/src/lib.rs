//! Renderer crate root.
//!
//! Composites cached spectrogram tiles into a frame. The renderer never fetches:
//! every frame draws whatever subset of the visible tiles the cache holds.
//!
//! Internal architecture overview:
//! - `renderer_init`: constructs the pipeline, colour table and per-frame buffers.
//! - `renderer_upload`: turns decoded tile powers into cached GPU textures.
//! - `renderer_frame`: writes per-frame uniforms and records the composite pass.
//! - `geometry`: tile-to-screen planning shared by the frame pass and tests.

use std::fmt;

use colormap::ColorMapKind;
use serde::{Deserialize, Serialize};
use tiles::{TileCache, TileDecodeError, TileResource};

pub use geometry::{FramePlan, TileQuad, plan_frame};
pub use renderer_frame::FrameReport;

pub const DEFAULT_BACKGROUND: [f32; 4] = [0.02, 0.035, 0.06, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub color_map: ColorMapKind,
    /// Clear colour, also drawn where the frequency view runs past the spectrum.
    pub background: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            color_map: ColorMapKind::default(),
            background: DEFAULT_BACKGROUND,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniformGpu {
    pub power_min: f32,
    pub power_max: f32,
    pub zoom_y: f32,
    pub y_offset: f32,
    pub background: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TileQuadGpu {
    pub left: f32,
    pub right: f32,
}

/// How tile textures are sampled. `R32Float` is only filterable with
/// `Features::FLOAT32_FILTERABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFiltering {
    Linear,
    Nearest,
}

impl TileFiltering {
    pub fn for_features(features: wgpu::Features) -> Self {
        if features.contains(wgpu::Features::FLOAT32_FILTERABLE) {
            TileFiltering::Linear
        } else {
            TileFiltering::Nearest
        }
    }

    fn filter_mode(self) -> wgpu::FilterMode {
        match self {
            TileFiltering::Linear => wgpu::FilterMode::Linear,
            TileFiltering::Nearest => wgpu::FilterMode::Nearest,
        }
    }

    fn is_filterable(self) -> bool {
        matches!(self, TileFiltering::Linear)
    }
}

/// One cached tile texture with the bind group that samples it.
pub struct GpuTile {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    rows: u32,
    released: bool,
}

impl TileResource for GpuTile {
    fn row_count(&self) -> u32 {
        self.rows
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.texture.destroy();
        self.released = true;
    }
}

impl fmt::Debug for GpuTile {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GpuTile")
            .field("rows", &self.rows)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum RendererInitError {
    Shader(String),
    Pipeline(String),
}

impl fmt::Display for RendererInitError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RendererInitError::Shader(message) => {
                write!(formatter, "spectrogram shader rejected: {message}")
            }
            RendererInitError::Pipeline(message) => {
                write!(formatter, "spectrogram pipeline rejected: {message}")
            }
        }
    }
}

impl std::error::Error for RendererInitError {}

#[derive(Debug)]
pub enum TileUploadError {
    Decode(TileDecodeError),
    FftSizeExceedsDeviceLimit { fft_size: u32, max: u32 },
    RowsExceedDeviceLimit { rows: u32, max: u32 },
    Validation(String),
}

impl fmt::Display for TileUploadError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileUploadError::Decode(error) => write!(formatter, "tile decode failed: {error}"),
            TileUploadError::FftSizeExceedsDeviceLimit { fft_size, max } => write!(
                formatter,
                "fft size {fft_size} exceeds the device texture limit {max}"
            ),
            TileUploadError::RowsExceedDeviceLimit { rows, max } => write!(
                formatter,
                "tile row count {rows} exceeds the device texture limit {max}"
            ),
            TileUploadError::Validation(message) => {
                write!(formatter, "tile texture rejected: {message}")
            }
        }
    }
}

impl std::error::Error for TileUploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TileUploadError::Decode(error) => Some(error),
            _ => None,
        }
    }
}

impl From<TileDecodeError> for TileUploadError {
    fn from(error: TileDecodeError) -> Self {
        TileUploadError::Decode(error)
    }
}

#[derive(Debug)]
pub enum PresentError {
    Surface(wgpu::SurfaceError),
}

impl fmt::Display for PresentError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresentError::Surface(error) => write!(formatter, "surface unavailable: {error}"),
        }
    }
}

impl std::error::Error for PresentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PresentError::Surface(error) => Some(error),
        }
    }
}

struct GpuState {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: wgpu::TextureFormat,
    pipeline: wgpu::RenderPipeline,
    frame_bind_group_layout: wgpu::BindGroupLayout,
    frame_bind_group: wgpu::BindGroup,
    tile_bind_group_layout: wgpu::BindGroupLayout,
    tile_sampler: wgpu::Sampler,
    tile_filtering: TileFiltering,
    frame_uniform_buffer: wgpu::Buffer,
    color_map_texture: wgpu::Texture,
    color_map_view: wgpu::TextureView,
    tile_quad_buffer: wgpu::Buffer,
    tile_quad_capacity: usize,
    tile_quad_staging: Vec<TileQuadGpu>,
}

struct CacheState {
    tiles: TileCache<GpuTile>,
}

pub struct Renderer {
    gpu_state: GpuState,
    cache_state: CacheState,
    config: RendererConfig,
}

const INITIAL_TILE_QUAD_CAPACITY: usize = 64;

mod geometry;

mod renderer_frame;

mod renderer_init;

mod renderer_upload;

#[cfg(test)]
mod tests;
