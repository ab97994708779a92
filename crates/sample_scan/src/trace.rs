//! Time-domain trace under the spectrogram: one decimated IQ sample per pixel column.

use render_protocol::{RenderParams, SampleRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceWindow {
    request: SampleRequest,
    columns: u32,
}

impl TraceWindow {
    /// Request covering the visible window at the viewport stride, or `None` when the
    /// view starts past the end of the data.
    pub fn for_params(params: &RenderParams) -> Option<Self> {
        let start = params.scroll_offset_x.max(0.0).floor() as u64;
        if start >= params.total_samples || params.viewport_width == 0 {
            return None;
        }
        let stride = params.stride.max(1);
        let visible = u64::from(params.viewport_width) * u64::from(stride);
        let request = SampleRequest {
            start,
            length: visible.min(params.total_samples - start),
            stride,
        };
        Some(Self {
            request,
            columns: params.viewport_width,
        })
    }

    pub fn request(&self) -> SampleRequest {
        self.request
    }

    /// `(i, q)` per pixel column, shorter than the viewport when the data ends early.
    pub fn columns(&self, buffer: &[f32]) -> Vec<(f32, f32)> {
        buffer
            .chunks_exact(2)
            .take(self.columns as usize)
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }

    /// Largest absolute I or Q value, for scaling the plot. At least `f32::EPSILON`.
    pub fn peak_amplitude(columns: &[(f32, f32)]) -> f32 {
        columns
            .iter()
            .map(|(i, q)| i.abs().max(q.abs()))
            .fold(f32::EPSILON, f32::max)
    }
}
