//! Tile-to-screen planning.
//!
//! Maps the visible tile addresses onto pixel columns using each cached tile's
//! actual row count, and converts the result to clip space.

use render_protocol::RenderParams;
use tiles::{TileAddress, TileCache, TileResource, visible_tiles};

use crate::{FrameUniformGpu, TileQuadGpu};

/// A cached tile's horizontal extent in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileQuad {
    pub address: TileAddress,
    pub left_px: f64,
    pub right_px: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    /// Addresses intersecting the viewport, cached or not.
    pub visible_tiles: usize,
    /// Quads for the cached subset, in ascending sample order.
    pub quads: Vec<TileQuad>,
}

/// Plans one frame. Looking a tile up marks it as recently used; missing tiles are
/// skipped without a placeholder.
pub fn plan_frame<R: TileResource>(params: &RenderParams, cache: &mut TileCache<R>) -> FramePlan {
    let stride = f64::from(params.stride.max(1));
    let visible = visible_tiles(params);
    let mut quads = Vec::with_capacity(visible.len());
    for address in &visible {
        let Some(tile) = cache.get(address) else {
            continue;
        };
        let left_px = (address.sample_start as f64 - params.scroll_offset_x) / stride;
        quads.push(TileQuad {
            address: *address,
            left_px,
            right_px: left_px + f64::from(tile.row_count()),
        });
    }
    FramePlan {
        visible_tiles: visible.len(),
        quads,
    }
}

pub(super) fn tile_quad_gpu(quad: &TileQuad, viewport_width: u32) -> TileQuadGpu {
    let width = f64::from(viewport_width.max(1));
    TileQuadGpu {
        left: (quad.left_px / width * 2.0 - 1.0) as f32,
        right: (quad.right_px / width * 2.0 - 1.0) as f32,
    }
}

pub(super) fn frame_uniform(params: &RenderParams, background: [f32; 4]) -> FrameUniformGpu {
    FrameUniformGpu {
        power_min: params.power_min,
        power_max: params.power_max,
        zoom_y: params.zoom_y.max(1.0),
        y_offset: params.scroll_offset_y_norm,
        background,
    }
}
