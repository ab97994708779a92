//! Axis labelling: pixel to physical unit conversion, tick placement and unit
//! formatting for the time and frequency rulers.

use crate::ViewportState;

/// Ticks are never closer together than this many pixels.
pub const MIN_TICK_SPACING: f64 = 80.0;
pub const FREQUENCY_TICK_COUNT: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XAxisMode {
    #[default]
    Samples,
    Time,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxisTick {
    pub pixel: f64,
    pub value: f64,
    pub label: String,
}

/// Frequency at vertical pixel `y`, with the top of an unzoomed view at `+fs/2`.
pub fn pixel_to_frequency(state: &ViewportState, y: f64, sample_rate: f64) -> f64 {
    let offset_norm = state.scroll_offset_y() / state.total_bins();
    let fraction = y / f64::from(state.height()) / state.zoom_y();
    (0.5 - offset_norm - fraction) * sample_rate
}

/// Rounds `value` up or down to 1, 2 or 5 times a power of ten.
pub fn nice_tick_interval(value: f64) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        return 0.0;
    }
    let exponent = value.log10().floor();
    let magnitude = 10f64.powi(exponent as i32);
    let fraction = value / magnitude;
    let nice = if fraction <= 1.5 {
        1.0
    } else if fraction <= 3.5 {
        2.0
    } else if fraction <= 7.5 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

/// Ticks for the horizontal ruler over the visible sample window.
///
/// In [`XAxisMode::Time`] the interval is chosen as a nice number of seconds, in
/// [`XAxisMode::Samples`] as a nice number of samples.
pub fn time_ticks(state: &ViewportState, sample_rate: f64, mode: XAxisMode) -> Vec<AxisTick> {
    let stride = f64::from(state.stride());
    let width = f64::from(state.width());
    let min_tick_samples = MIN_TICK_SPACING * stride;

    let interval = match mode {
        XAxisMode::Time if sample_rate > 0.0 => {
            nice_tick_interval(min_tick_samples / sample_rate) * sample_rate
        }
        XAxisMode::Time => return Vec::new(),
        XAxisMode::Samples => nice_tick_interval(min_tick_samples),
    };
    if interval <= 0.0 || !interval.is_finite() {
        return Vec::new();
    }

    let start = state.scroll_offset_x();
    let mut ticks = Vec::new();
    let mut index = (start / interval).ceil();
    loop {
        let sample = index * interval;
        let pixel = (sample - start) / stride;
        if pixel > width {
            break;
        }
        let label = match mode {
            XAxisMode::Time => format_time(sample / sample_rate),
            XAxisMode::Samples => format_sample_label(sample),
        };
        ticks.push(AxisTick {
            pixel,
            value: sample,
            label,
        });
        index += 1.0;
    }
    ticks
}

/// Evenly spaced ticks down the vertical ruler, labelled with the frequency under each.
pub fn frequency_ticks(state: &ViewportState, sample_rate: f64) -> Vec<AxisTick> {
    let height = f64::from(state.height());
    (0..=FREQUENCY_TICK_COUNT)
        .map(|index| {
            let pixel = f64::from(index) / f64::from(FREQUENCY_TICK_COUNT) * height;
            let value = pixel_to_frequency(state, pixel, sample_rate);
            AxisTick {
                pixel,
                value,
                label: format_frequency(value),
            }
        })
        .collect()
}

pub fn format_sample_label(sample: f64) -> String {
    if sample >= 1e6 {
        format!("{:.1}M", sample / 1e6)
    } else if sample >= 1e3 {
        format!("{:.1}k", sample / 1e3)
    } else {
        format!("{sample}")
    }
}

pub fn format_time(seconds: f64) -> String {
    let magnitude = seconds.abs();
    let (divisor, suffix) = if magnitude >= 1.0 {
        (1.0, "s")
    } else if magnitude >= 1e-3 {
        (1e-3, "ms")
    } else if magnitude >= 1e-6 {
        (1e-6, "\u{b5}s")
    } else {
        (1e-9, "ns")
    };
    format!("{:.2} {suffix}", seconds / divisor)
}

pub fn format_frequency(hz: f64) -> String {
    let magnitude = hz.abs();
    if magnitude >= 1e9 {
        format!("{:.3} GHz", hz / 1e9)
    } else if magnitude >= 1e6 {
        format!("{:.3} MHz", hz / 1e6)
    } else if magnitude >= 1e3 {
        format!("{:.3} kHz", hz / 1e3)
    } else {
        format!("{hz:.1} Hz")
    }
}

pub fn format_sample_rate(rate: f64) -> String {
    if rate >= 1e6 {
        format!("{:.2} MSps", rate / 1e6)
    } else if rate >= 1e3 {
        format!("{:.2} kSps", rate / 1e3)
    } else {
        format!("{rate:.0} Sps")
    }
}
