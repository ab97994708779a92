//! Spectrogram viewport engine.
//!
//! [`SpectrogramView`] ties the viewport model to the tile scheduler and the
//! renderer. Every viewport mutation goes through [`SpectrogramView::apply`]; when
//! the mutation changes tile addressing a new scheduler pass is queued, otherwise
//! the current frame is simply redrawn. The host drives queued passes on its own
//! single-threaded executor via [`SpectrogramView::take_pending_pass`].

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use render_protocol::{RenderParams, TileSource};
use renderer::{FrameReport, Renderer, RendererInitError};
use tile_scheduler::{Generation, PassReport, TileScheduler, TileSchedulerConfig, TileSink};
use view::ViewportState;
use winit::window::Window;

pub mod config;
pub mod scan;
pub mod sink;
pub mod synthetic;

pub use config::{ConfigError, EngineConfig};
pub use scan::{PulseScanRequest, PulseScanTask};
pub use sink::{FrameSink, RenderSink, SurfaceTarget};

#[derive(Debug)]
pub enum ViewInitError {
    Surface(String),
    Adapter(String),
    Device(String),
    Renderer(RendererInitError),
}

impl fmt::Display for ViewInitError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewInitError::Surface(reason) => write!(formatter, "cannot create surface: {reason}"),
            ViewInitError::Adapter(reason) => write!(formatter, "no usable GPU adapter: {reason}"),
            ViewInitError::Device(reason) => write!(formatter, "cannot open GPU device: {reason}"),
            ViewInitError::Renderer(error) => write!(formatter, "renderer setup failed: {error}"),
        }
    }
}

impl std::error::Error for ViewInitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ViewInitError::Renderer(error) => Some(error),
            _ => None,
        }
    }
}

impl From<RendererInitError> for ViewInitError {
    fn from(error: RendererInitError) -> Self {
        ViewInitError::Renderer(error)
    }
}

/// What a call to [`SpectrogramView::apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewUpdate {
    Unchanged,
    /// Only colour or frequency view changed; the cached tiles were redrawn.
    Redrawn,
    /// Tile addressing changed; a pass for the new generation is pending.
    PassStarted(Generation),
}

pub struct SpectrogramView<S, K = RenderSink> {
    state: ViewportState,
    params: RenderParams,
    sink: Rc<RefCell<K>>,
    source: Rc<S>,
    scheduler: TileScheduler,
    pending: Option<(Generation, RenderParams)>,
}

impl<S: TileSource, K: FrameSink> SpectrogramView<S, K> {
    /// Starts with a pending pass for the initial viewport.
    pub fn with_sink(
        state: ViewportState,
        mut sink: K,
        source: S,
        scheduler_config: TileSchedulerConfig,
    ) -> Self {
        let params = state.render_params();
        sink.set_params(params);
        let scheduler = TileScheduler::new(scheduler_config);
        let generation = scheduler.begin_pass();
        Self {
            state,
            params,
            sink: Rc::new(RefCell::new(sink)),
            source: Rc::new(source),
            scheduler,
            pending: Some((generation, params)),
        }
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn params(&self) -> RenderParams {
        self.params
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> Ref<'_, K> {
        self.sink.borrow()
    }

    pub fn sink_mut(&self) -> RefMut<'_, K> {
        self.sink.borrow_mut()
    }

    pub fn scheduler(&self) -> &TileScheduler {
        &self.scheduler
    }

    pub fn has_pending_pass(&self) -> bool {
        self.pending.is_some()
    }

    /// Mutates the viewport and reacts to what changed.
    pub fn apply(&mut self, change: impl FnOnce(&mut ViewportState)) -> ViewUpdate {
        change(&mut self.state);
        let params = self.state.render_params();
        if params == self.params {
            return ViewUpdate::Unchanged;
        }
        let addressing_changed = params.addressing() != self.params.addressing();
        self.params = params;
        self.sink.borrow_mut().set_params(params);
        if addressing_changed {
            let generation = self.scheduler.begin_pass();
            self.pending = Some((generation, params));
            ViewUpdate::PassStarted(generation)
        } else {
            self.sink.borrow_mut().present();
            ViewUpdate::Redrawn
        }
    }

    /// Resizes the output and the viewport. Zoom limits are recomputed right away.
    pub fn resize(&mut self, width: u32, height: u32) -> ViewUpdate {
        self.sink.borrow_mut().resize(width, height);
        self.apply(|state| state.resize(width, height))
    }

    /// The source now serves different content under the same addresses: drops every
    /// cached tile and supersedes in-flight passes.
    pub fn set_source_changed(&mut self) -> Generation {
        let released = self.sink.borrow_mut().clear_tiles();
        let generation = self.scheduler.begin_pass();
        tracing::info!(
            released,
            generation = generation.value(),
            "tile source changed, cache cleared"
        );
        self.pending = Some((generation, self.params));
        generation
    }

    /// Swaps in a new source of `total_samples` samples.
    pub fn replace_source(&mut self, source: S, total_samples: u64) -> Generation {
        self.source = Rc::new(source);
        self.state.set_total_samples(total_samples);
        self.params = self.state.render_params();
        self.sink.borrow_mut().set_params(self.params);
        self.set_source_changed()
    }

    /// Redraws the current frame from whatever is cached.
    pub fn present(&self) {
        self.sink.borrow_mut().present();
    }

    /// The pass queued by the last addressing change, ready to be spawned on a local
    /// executor. A later change supersedes it even after it started running.
    pub fn take_pending_pass(&mut self) -> Option<impl Future<Output = PassReport> + use<S, K>> {
        let (generation, params) = self.pending.take()?;
        let scheduler = self.scheduler.clone();
        let source = Rc::clone(&self.source);
        let sink = Rc::clone(&self.sink);
        Some(async move {
            scheduler
                .run_pass(generation, params, &*source, &*sink)
                .await
        })
    }
}

impl<S: TileSource> SpectrogramView<S, RenderSink> {
    /// Opens a GPU device and a surface for `window`.
    ///
    /// Float filtering is requested when the adapter offers it; the renderer falls
    /// back to nearest sampling otherwise.
    pub async fn for_window(
        window: Arc<Window>,
        source: S,
        total_samples: u64,
        config: EngineConfig,
    ) -> Result<Self, ViewInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|error| ViewInitError::Surface(error.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|error| ViewInitError::Adapter(error.to_string()))?;

        let required_features = adapter.features() & wgpu::Features::FLOAT32_FILTERABLE;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("spectrogram.device"),
                required_features,
                required_limits: adapter.limits(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|error| ViewInitError::Device(error.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = caps.formats.first() else {
            return Err(ViewInitError::Surface(
                "surface reports no supported formats".to_owned(),
            ));
        };
        // Colour table entries are already display encoded.
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .unwrap_or(first_format);

        let mut size = window.inner_size();
        size.width = size.width.max(1);
        size.height = size.height.max(1);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let renderer = Renderer::new(
            device,
            queue,
            surface_format,
            config.renderer,
            config.tile_cache,
        )?;
        tracing::info!(
            adapter = %adapter.get_info().name,
            format = ?surface_format,
            width = size.width,
            height = size.height,
            "spectrogram view ready"
        );

        let state =
            ViewportState::with_defaults(total_samples, size.width, size.height, config.view);
        let sink = RenderSink::new(renderer, Some(SurfaceTarget::new(surface, surface_config)));
        Ok(Self::with_sink(state, sink, source, config.scheduler))
    }

    /// Draws the current frame into an arbitrary target of the renderer's format.
    pub fn render_to(&self, target: &wgpu::TextureView) -> Option<FrameReport> {
        self.sink.borrow_mut().render_to(target)
    }

    pub fn set_color_map(&self, kind: colormap::ColorMapKind) {
        let mut sink = self.sink.borrow_mut();
        sink.renderer_mut().set_color_map(kind);
        sink.present();
    }
}
