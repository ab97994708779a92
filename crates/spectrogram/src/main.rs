use std::path::PathBuf;
use std::sync::Arc;

use colormap::ColorMapKind;
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use sample_scan::{PulseScanner, ScanDirection};
use spectrogram::synthetic::ChirpSource;
use spectrogram::{EngineConfig, PulseScanRequest, PulseScanTask, SpectrogramView};
use tracing_subscriber::EnvFilter;
use view::{WheelMode, WheelModifiers};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const PIXELS_PER_SCROLL_LINE: f64 = 120.0;
const POWER_STEP_DB: f32 = 5.0;
const PULSE_THRESHOLD: f32 = 0.25;
const DEMO_TOTAL_SAMPLES: u64 = 1 << 26;
const DEMO_PULSE_PERIOD: u64 = 1 << 20;
const DEMO_DUTY: f64 = 0.3;
const DEMO_SWEEP_LENGTH: u64 = 1 << 18;

#[derive(Debug, Clone, Copy)]
enum DemoEvent {
    PulseScanFinished {
        scan_id: u64,
        direction: ScanDirection,
        found: Option<u64>,
    },
}

#[derive(Default)]
struct App {
    config: EngineConfig,
    window: Option<Arc<Window>>,
    view: Option<SpectrogramView<ChirpSource>>,
    pool: LocalPool,
    modifiers: ModifiersState,
    last_cursor_position: Option<(f64, f64)>,
    is_dragging: bool,
    proxy: Option<EventLoopProxy<DemoEvent>>,
    pulse_scan: Option<PulseScanTask>,
    next_scan_id: u64,
}

impl App {
    fn window_id(&self) -> Option<WindowId> {
        self.window.as_ref().map(|w| w.id())
    }

    fn wheel_modifiers(&self) -> WheelModifiers {
        WheelModifiers {
            zoom: self.modifiers.control_key() || self.modifiers.super_key(),
            shift: self.modifiers.shift_key(),
            alt: self.modifiers.alt_key(),
        }
    }

    fn pointer(&self) -> (f64, f64) {
        if let Some(position) = self.last_cursor_position {
            return position;
        }
        self.window
            .as_ref()
            .map(|window| {
                let size = window.inner_size();
                (f64::from(size.width) * 0.5, f64::from(size.height) * 0.5)
            })
            .unwrap_or((0.0, 0.0))
    }

    /// Spawns the pass queued by the last addressing change and runs every task that
    /// can make progress.
    fn drive_passes(&mut self) {
        if let Some(pass) = self.view.as_mut().and_then(|view| view.take_pending_pass()) {
            let spawned = self.pool.spawner().spawn_local(async move {
                let report = pass.await;
                tracing::debug!(?report, "tile pass finished");
            });
            if let Err(error) = spawned {
                tracing::warn!(%error, "cannot spawn tile pass");
            }
        }
        self.pool.run_until_stalled();
    }

    fn cancel_pulse_scan(&mut self) {
        if let Some(scan) = self.pulse_scan.take() {
            scan.cancel();
        }
    }

    /// Starts a scan from the centre of the view; the result arrives as a
    /// [`DemoEvent::PulseScanFinished`].
    fn start_pulse_scan(&mut self, direction: ScanDirection) {
        self.cancel_pulse_scan();
        let (Some(view), Some(proxy)) = (self.view.as_ref(), self.proxy.clone()) else {
            return;
        };
        let state = view.state();
        let request = PulseScanRequest {
            start: state.pixel_to_sample(f64::from(state.width()) * 0.5).max(0.0) as u64,
            direction,
            total_samples: state.total_samples(),
            threshold: PULSE_THRESHOLD,
        };

        self.next_scan_id += 1;
        let scan_id = self.next_scan_id;
        let spawned = PulseScanTask::spawn(
            PulseScanner::new(self.config.pulse_scan),
            *view.source(),
            request,
            move |found| {
                let _ = proxy.send_event(DemoEvent::PulseScanFinished {
                    scan_id,
                    direction,
                    found,
                });
            },
        );
        match spawned {
            Ok(scan) => self.pulse_scan = Some(scan),
            Err(error) => tracing::warn!(%error, "cannot start pulse scan"),
        }
    }

    fn finish_pulse_scan(&mut self, scan_id: u64, direction: ScanDirection, found: Option<u64>) {
        if scan_id != self.next_scan_id {
            return;
        }
        self.pulse_scan = None;
        let Some(view) = self.view.as_mut() else {
            return;
        };
        match found {
            Some(sample) => {
                tracing::info!(sample, ?direction, "jumping to pulse");
                view.apply(|state| state.scroll_x_to(sample as f64 - state.viewport_samples() * 0.5));
            }
            None => tracing::info!(?direction, "no pulse found"),
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::KeyN => self.start_pulse_scan(ScanDirection::Forward),
            KeyCode::KeyP => self.start_pulse_scan(ScanDirection::Backward),
            KeyCode::Escape => self.cancel_pulse_scan(),
            _ => {}
        }
        let Some(view) = self.view.as_mut() else {
            return;
        };
        match key {
            KeyCode::KeyF => {
                view.apply(|state| state.fit_to_view());
                tracing::info!(stride = view.params().stride, "fit to view");
            }
            KeyCode::KeyC => {
                let next = match view.sink().renderer().config().color_map {
                    ColorMapKind::PlasmaDark => ColorMapKind::Inspectrum,
                    ColorMapKind::Inspectrum => ColorMapKind::PlasmaDark,
                };
                view.set_color_map(next);
            }
            KeyCode::BracketLeft | KeyCode::BracketRight => {
                let step = if key == KeyCode::BracketLeft {
                    -POWER_STEP_DB
                } else {
                    POWER_STEP_DB
                };
                view.apply(|state| state.set_power_range(state.power_min() + step, state.power_max()));
            }
            _ => {}
        }
    }
}

impl ApplicationHandler<DemoEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        if self.window.is_some() {
            return;
        }

        let window = Arc::new(
            event_loop
                .create_window(
                    WindowAttributes::default()
                        .with_title("spectrogram")
                        .with_inner_size(PhysicalSize::new(1280u32, 720u32)),
                )
                .expect("create window"),
        );

        let source = ChirpSource::new(
            DEMO_TOTAL_SAMPLES,
            DEMO_PULSE_PERIOD,
            DEMO_DUTY,
            DEMO_SWEEP_LENGTH,
        );
        match pollster::block_on(SpectrogramView::for_window(
            window.clone(),
            source,
            DEMO_TOTAL_SAMPLES,
            self.config,
        )) {
            Ok(view) => self.view = Some(view),
            Err(error) => tracing::error!(%error, "spectrogram view unavailable"),
        }
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window_id() != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.cancel_pulse_scan();
                event_loop.exit();
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.handle_key(key);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.is_dragging = state == ElementState::Pressed;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let (true, Some((last_x, _)), Some(view)) = (
                    self.is_dragging,
                    self.last_cursor_position,
                    self.view.as_mut(),
                ) {
                    let delta_x = last_x - position.x;
                    view.apply(|state| state.scroll_x_by_pixels(delta_x));
                }
                self.last_cursor_position = Some((position.x, position.y));
            }
            WindowEvent::CursorLeft { .. } => {
                self.last_cursor_position = None;
                self.is_dragging = false;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll_lines = match delta {
                    MouseScrollDelta::LineDelta(_, vertical_lines) => f64::from(vertical_lines),
                    MouseScrollDelta::PixelDelta(physical_position) => {
                        physical_position.y / PIXELS_PER_SCROLL_LINE
                    }
                };
                let mode = WheelMode::from_modifiers(self.wheel_modifiers());
                let (pointer_x, pointer_y) = self.pointer();
                if let Some(view) = self.view.as_mut() {
                    view.apply(|state| state.apply_wheel(mode, scroll_lines, pointer_x, pointer_y));
                }
            }
            WindowEvent::Resized(new_size) => {
                if let Some(view) = self.view.as_mut() {
                    view.resize(new_size.width, new_size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(view) = self.view.as_ref() else {
                    return;
                };
                view.present();
                let surface_error = view.sink_mut().take_surface_error();
                match surface_error {
                    None => {}
                    Some(wgpu::SurfaceError::OutOfMemory) => {
                        event_loop.exit();
                    }
                    Some(_) => {
                        if let Some(window) = self.window.as_ref() {
                            window.request_redraw();
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: DemoEvent) {
        match event {
            DemoEvent::PulseScanFinished {
                scan_id,
                direction,
                found,
            } => self.finish_pulse_scan(scan_id, direction, found),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.drive_passes();
    }
}

fn parse_config_path() -> Option<PathBuf> {
    std::env::args_os().nth(1).map(PathBuf::from)
}

fn load_config() -> EngineConfig {
    let Some(path) = parse_config_path() else {
        return EngineConfig::default();
    };
    match EngineConfig::load(&path) {
        Ok(config) => config,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "using default engine config");
            EngineConfig::default()
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let event_loop = EventLoop::<DemoEvent>::with_user_event()
        .build()
        .expect("create event loop");
    let mut app = App {
        config: load_config(),
        proxy: Some(event_loop.create_proxy()),
        ..App::default()
    };
    event_loop.run_app(&mut app).expect("run app");
}
