//! Viewport coordinate model.
//!
//! Converts between sample/bin space and pixel space and owns the zoom and scroll
//! policy for both axes. Every input is clamped; nothing here returns an error.

use render_protocol::RenderParams;
use serde::{Deserialize, Serialize};

pub mod axis;
pub mod scrollbar;

pub const DEFAULT_FFT_SIZE: u32 = 2048;
pub const DEFAULT_POWER_MIN: f32 = -100.0;
pub const DEFAULT_POWER_MAX: f32 = 0.0;
pub const MIN_ZOOM_Y: f64 = 1.0;

/// Zoom factor per wheel line on the time axis.
const WHEEL_ZOOM_SPEED: f64 = 0.1;
/// The frequency axis zooms at half the logarithmic rate of the time axis.
const FREQUENCY_WHEEL_RATE: f64 = 0.5;
const PAN_PIXELS_PER_LINE: f64 = 40.0;
const MIN_POWER_SPAN: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewDefaults {
    pub fft_size: u32,
    pub zoom_x: f64,
    pub power_min: f32,
    pub power_max: f32,
}

impl Default for ViewDefaults {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            zoom_x: 1.0,
            power_min: DEFAULT_POWER_MIN,
            power_max: DEFAULT_POWER_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelMode {
    Combined,
    TimeOnly,
    FrequencyOnly,
    Pan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WheelModifiers {
    /// Ctrl on most platforms, Cmd on macOS.
    pub zoom: bool,
    pub shift: bool,
    pub alt: bool,
}

impl WheelMode {
    pub fn from_modifiers(modifiers: WheelModifiers) -> Self {
        match (modifiers.zoom, modifiers.shift, modifiers.alt) {
            (true, true, _) => WheelMode::TimeOnly,
            (true, false, true) => WheelMode::FrequencyOnly,
            (true, false, false) => WheelMode::Combined,
            (false, _, _) => WheelMode::Pan,
        }
    }
}

/// `max(1, round(fft_size / zoom_x))`.
pub fn stride_for_zoom(fft_size: u32, zoom_x: f64) -> u32 {
    if !zoom_x.is_finite() || zoom_x <= 0.0 {
        return fft_size.max(1);
    }
    let stride = (f64::from(fft_size) / zoom_x).round();
    if stride >= f64::from(u32::MAX) {
        return u32::MAX;
    }
    (stride as u32).max(1)
}

/// Stride after applying `factor` to the zoom of `current_stride`.
///
/// A factor above 1 zooms in. If rounding would leave the stride unchanged it is
/// forced one step in the requested direction, so every gesture has a visible effect
/// until the `[1, max_stride]` bounds are reached.
pub fn snap_stride(current_stride: u32, factor: f64, fft_size: u32, max_stride: u32) -> u32 {
    let max_stride = max_stride.max(1);
    let current_stride = current_stride.clamp(1, max_stride);
    let direction = if !factor.is_finite() || factor <= 0.0 || factor == 1.0 {
        return current_stride;
    } else if factor > 1.0 {
        ZoomDirection::In
    } else {
        ZoomDirection::Out
    };

    let current_zoom = f64::from(fft_size.max(1)) / f64::from(current_stride);
    let naive = stride_for_zoom(fft_size.max(1), current_zoom * factor).clamp(1, max_stride);
    if naive != current_stride {
        return naive;
    }
    match direction {
        ZoomDirection::In => current_stride.saturating_sub(1).max(1),
        ZoomDirection::Out => current_stride.saturating_add(1).min(max_stride),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    total_samples: u64,
    fft_size: u32,
    zoom_x: f64,
    scroll_offset_x: f64,
    zoom_y: f64,
    scroll_offset_y: f64,
    power_min: f32,
    power_max: f32,
    width: u32,
    height: u32,
}

impl ViewportState {
    pub fn new(total_samples: u64, width: u32, height: u32) -> Self {
        Self::with_defaults(total_samples, width, height, ViewDefaults::default())
    }

    pub fn with_defaults(total_samples: u64, width: u32, height: u32, defaults: ViewDefaults) -> Self {
        let mut state = Self {
            total_samples,
            fft_size: defaults.fft_size.max(1),
            zoom_x: 1.0,
            scroll_offset_x: 0.0,
            zoom_y: MIN_ZOOM_Y,
            scroll_offset_y: 0.0,
            power_min: DEFAULT_POWER_MIN,
            power_max: DEFAULT_POWER_MAX,
            width: width.max(1),
            height: height.max(1),
        };
        state.set_power_range(defaults.power_min, defaults.power_max);
        state.set_zoom_x(defaults.zoom_x);
        state
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn fft_size(&self) -> u32 {
        self.fft_size
    }

    pub fn zoom_x(&self) -> f64 {
        self.zoom_x
    }

    pub fn scroll_offset_x(&self) -> f64 {
        self.scroll_offset_x
    }

    pub fn zoom_y(&self) -> f64 {
        self.zoom_y
    }

    pub fn scroll_offset_y(&self) -> f64 {
        self.scroll_offset_y
    }

    pub fn power_min(&self) -> f32 {
        self.power_min
    }

    pub fn power_max(&self) -> f32 {
        self.power_max
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        stride_for_zoom(self.fft_size, self.zoom_x)
    }

    pub fn total_bins(&self) -> f64 {
        f64::from(self.fft_size)
    }

    pub fn visible_bins(&self) -> f64 {
        self.total_bins() / self.zoom_y
    }

    pub fn viewport_samples(&self) -> f64 {
        f64::from(self.width) * f64::from(self.stride())
    }

    pub fn sample_to_pixel(&self, sample: f64) -> f64 {
        (sample - self.scroll_offset_x) / f64::from(self.stride())
    }

    pub fn pixel_to_sample(&self, pixel: f64) -> f64 {
        self.scroll_offset_x + pixel * f64::from(self.stride())
    }

    /// Smallest stride that shows the whole source in the current width.
    pub fn fit_stride(&self) -> u32 {
        let stride = self.total_samples.div_ceil(u64::from(self.width)).max(1);
        u32::try_from(stride).unwrap_or(u32::MAX)
    }

    /// Zooming out stops once the whole source fits, or at zoom 1 for short sources.
    pub fn max_stride(&self) -> u32 {
        self.fft_size.max(self.fit_stride())
    }

    pub fn min_zoom_x(&self) -> f64 {
        f64::from(self.fft_size) / f64::from(self.max_stride())
    }

    pub fn max_zoom_x(&self) -> f64 {
        f64::from(self.fft_size)
    }

    pub fn max_scroll_offset_x(&self) -> f64 {
        (self.total_samples as f64 - self.viewport_samples()).max(0.0)
    }

    pub fn max_scroll_offset_y(&self) -> f64 {
        (self.total_bins() - self.visible_bins()).max(0.0)
    }

    pub fn set_zoom_x(&mut self, zoom_x: f64) {
        if !zoom_x.is_finite() {
            return;
        }
        self.zoom_x = zoom_x.clamp(self.min_zoom_x(), self.max_zoom_x());
        self.clamp_scroll();
    }

    /// Zooms the time axis keeping the sample under `mouse_x` fixed.
    pub fn zoom_x_at(&mut self, mouse_x: f64, factor: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let mouse_x = finite_or(mouse_x, 0.0).clamp(0.0, f64::from(self.width));
        let old_stride = self.stride();
        let sample_at_cursor = self.scroll_offset_x + mouse_x * f64::from(old_stride);

        let new_stride = snap_stride(old_stride, factor, self.fft_size, self.max_stride());
        self.zoom_x = f64::from(self.fft_size) / f64::from(new_stride);
        self.scroll_offset_x = sample_at_cursor - mouse_x * f64::from(new_stride);
        self.clamp_scroll();
    }

    pub fn set_zoom_y(&mut self, zoom_y: f64) {
        if !zoom_y.is_finite() {
            return;
        }
        self.zoom_y = zoom_y.clamp(MIN_ZOOM_Y, self.total_bins().max(MIN_ZOOM_Y));
        self.clamp_scroll();
    }

    /// Zooms the frequency axis keeping the bin at `fraction` of the height fixed.
    pub fn zoom_y_at(&mut self, fraction: f64, factor: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let fraction = finite_or(fraction, 0.5).clamp(0.0, 1.0);
        let bin_at_cursor = self.scroll_offset_y + fraction * self.visible_bins();
        self.zoom_y =
            (self.zoom_y * factor).clamp(MIN_ZOOM_Y, self.total_bins().max(MIN_ZOOM_Y));
        self.scroll_offset_y = bin_at_cursor - fraction * self.visible_bins();
        self.clamp_scroll();
    }

    pub fn scroll_x_to(&mut self, offset: f64) {
        if !offset.is_finite() {
            return;
        }
        self.scroll_offset_x = offset;
        self.clamp_scroll();
    }

    pub fn scroll_x_by_pixels(&mut self, delta_pixels: f64) {
        if !delta_pixels.is_finite() {
            return;
        }
        self.scroll_x_to(self.scroll_offset_x + delta_pixels * f64::from(self.stride()));
    }

    pub fn scroll_y_to(&mut self, offset_bins: f64) {
        if !offset_bins.is_finite() {
            return;
        }
        self.scroll_offset_y = offset_bins;
        self.clamp_scroll();
    }

    /// Applies a scroll-wheel step. Positive `lines` zoom in (or pan backwards).
    pub fn apply_wheel(&mut self, mode: WheelMode, lines: f64, pointer_x: f64, pointer_y: f64) {
        if !lines.is_finite() || lines == 0.0 {
            return;
        }
        let factor_x = (lines * WHEEL_ZOOM_SPEED).exp();
        let factor_y = (lines * WHEEL_ZOOM_SPEED * FREQUENCY_WHEEL_RATE).exp();
        let fraction_y = finite_or(pointer_y, 0.0) / f64::from(self.height);
        match mode {
            WheelMode::Combined => {
                self.zoom_x_at(pointer_x, factor_x);
                self.zoom_y_at(fraction_y, factor_y);
            }
            WheelMode::TimeOnly => self.zoom_x_at(pointer_x, factor_x),
            WheelMode::FrequencyOnly => self.zoom_y_at(fraction_y, factor_y),
            WheelMode::Pan => self.scroll_x_by_pixels(-lines * PAN_PIXELS_PER_LINE),
        }
    }

    /// Shows the whole source: the smallest zoom whose window covers every sample.
    pub fn fit_to_view(&mut self) {
        let stride = self.fit_stride();
        self.zoom_x = (f64::from(self.fft_size) / f64::from(stride)).min(self.max_zoom_x());
        self.scroll_offset_x = 0.0;
        self.scroll_offset_y = 0.0;
        self.clamp_scroll();
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.zoom_x = self.zoom_x.clamp(self.min_zoom_x(), self.max_zoom_x());
        self.clamp_scroll();
    }

    /// Keeps the zoom ratio and the normalized frequency scroll position.
    pub fn set_fft_size(&mut self, fft_size: u32) {
        let fft_size = fft_size.max(1);
        let scroll_norm = self.scroll_offset_y / self.total_bins();
        self.fft_size = fft_size;
        self.zoom_x = self.zoom_x.clamp(self.min_zoom_x(), self.max_zoom_x());
        self.zoom_y = self.zoom_y.clamp(MIN_ZOOM_Y, self.total_bins().max(MIN_ZOOM_Y));
        self.scroll_offset_y = scroll_norm * self.total_bins();
        self.clamp_scroll();
    }

    pub fn set_total_samples(&mut self, total_samples: u64) {
        self.total_samples = total_samples;
        self.zoom_x = self.zoom_x.clamp(self.min_zoom_x(), self.max_zoom_x());
        self.clamp_scroll();
    }

    /// Reversed bounds are swapped and a degenerate range is widened slightly.
    pub fn set_power_range(&mut self, power_min: f32, power_max: f32) {
        if !power_min.is_finite() || !power_max.is_finite() {
            return;
        }
        let (low, high) = if power_min <= power_max {
            (power_min, power_max)
        } else {
            (power_max, power_min)
        };
        self.power_min = low;
        self.power_max = if high - low < MIN_POWER_SPAN {
            low + MIN_POWER_SPAN
        } else {
            high
        };
    }

    pub fn render_params(&self) -> RenderParams {
        RenderParams {
            scroll_offset_x: self.scroll_offset_x,
            fft_size: self.fft_size,
            stride: self.stride(),
            total_samples: self.total_samples,
            viewport_width: self.width,
            viewport_height: self.height,
            power_min: self.power_min,
            power_max: self.power_max,
            zoom_y: self.zoom_y as f32,
            scroll_offset_y_norm: (self.scroll_offset_y / self.total_bins()) as f32,
        }
    }

    fn clamp_scroll(&mut self) {
        self.scroll_offset_x = self.scroll_offset_x.clamp(0.0, self.max_scroll_offset_x());
        self.scroll_offset_y = self.scroll_offset_y.clamp(0.0, self.max_scroll_offset_y());
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}
