use render_protocol::RenderParams;
use renderer::{FrameReport, PresentError, Renderer, TileUploadError};
use tile_scheduler::TileSink;
use tiles::TileAddress;

/// A [`TileSink`] that also follows the viewport it draws.
pub trait FrameSink: TileSink {
    /// Parameters used by every later `present`.
    fn set_params(&mut self, params: RenderParams);

    /// Drops every cached tile and returns how many were released.
    fn clear_tiles(&mut self) -> usize;

    fn resize(&mut self, width: u32, height: u32);
}

pub struct SurfaceTarget {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl SurfaceTarget {
    /// `surface` must already be configured with `config`.
    pub fn new(surface: wgpu::Surface<'static>, config: wgpu::SurfaceConfiguration) -> Self {
        Self { surface, config }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn reconfigure(&self, device: &wgpu::Device) {
        self.surface.configure(device, &self.config);
    }
}

/// Renderer-backed sink; draws into an optional window surface.
pub struct RenderSink {
    renderer: Renderer,
    surface: Option<SurfaceTarget>,
    params: Option<RenderParams>,
    surface_error: Option<wgpu::SurfaceError>,
    last_report: Option<FrameReport>,
}

impl RenderSink {
    pub fn new(renderer: Renderer, surface: Option<SurfaceTarget>) -> Self {
        Self {
            renderer,
            surface,
            params: None,
            surface_error: None,
            last_report: None,
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn surface(&self) -> Option<&SurfaceTarget> {
        self.surface.as_ref()
    }

    pub fn params(&self) -> Option<RenderParams> {
        self.params
    }

    pub fn last_report(&self) -> Option<FrameReport> {
        self.last_report
    }

    /// The error of the last failed surface present that was not recovered by
    /// reconfiguring, if any.
    pub fn take_surface_error(&mut self) -> Option<wgpu::SurfaceError> {
        self.surface_error.take()
    }

    /// Draws the current parameters into `target`.
    pub fn render_to(&mut self, target: &wgpu::TextureView) -> Option<FrameReport> {
        let params = self.params?;
        let report = self.renderer.render(&params, target);
        self.last_report = Some(report);
        Some(report)
    }
}

impl TileSink for RenderSink {
    type UploadError = TileUploadError;

    fn contains(&self, address: &TileAddress) -> bool {
        self.renderer.has_tile(address)
    }

    fn upload(&mut self, address: TileAddress, values: Vec<f32>) -> Result<(), TileUploadError> {
        self.renderer.upload_tile(address, values)
    }

    fn present(&mut self) {
        let (Some(params), Some(target)) = (self.params, self.surface.as_ref()) else {
            return;
        };
        let presented = present_with_retry(
            &mut self.renderer,
            |renderer| match renderer.render_to_surface(&params, &target.surface) {
                Ok(report) => Ok(report),
                Err(PresentError::Surface(error)) => Err(error),
            },
            |renderer| target.reconfigure(renderer.device()),
        );
        match presented {
            Ok(report) => self.last_report = Some(report),
            Err(error) => {
                tracing::warn!(%error, "surface present failed");
                self.surface_error = Some(error);
            }
        }
    }
}

/// Presents once more after `reconfigure` when the surface was outdated or lost, so
/// the frame is not dropped.
fn present_with_retry<C, T>(
    context: &mut C,
    mut present: impl FnMut(&mut C) -> Result<T, wgpu::SurfaceError>,
    reconfigure: impl FnOnce(&mut C),
) -> Result<T, wgpu::SurfaceError> {
    match present(context) {
        Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
            tracing::debug!("surface outdated, reconfiguring");
            reconfigure(context);
            present(context)
        }
        result => result,
    }
}

impl FrameSink for RenderSink {
    fn set_params(&mut self, params: RenderParams) {
        self.params = Some(params);
    }

    fn clear_tiles(&mut self) -> usize {
        self.renderer.clear_tiles()
    }

    fn resize(&mut self, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        let Some(target) = self.surface.as_mut() else {
            return;
        };
        if target.config.width == width && target.config.height == height {
            return;
        }
        target.config.width = width;
        target.config.height = height;
        target.reconfigure(self.renderer.device());
    }
}
