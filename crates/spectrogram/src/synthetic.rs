//! Deterministic pulsed-chirp source for the demo and tests.
//!
//! The signal is on for the first `duty` fraction of every `pulse_period` samples.
//! While on it sweeps linearly from `-SWEEP_EXTENT` to `+SWEEP_EXTENT` cycles per
//! sample over `sweep_length` samples. Tile rows are computed analytically from the
//! instantaneous frequency, so no FFT is involved.

use std::f64::consts::TAU;
use std::future::{Future, ready};

use render_protocol::{FetchError, SampleRequest, SampleSource, TileRequest, TileSource};
use tiles::TileAddress;

const SWEEP_EXTENT: f64 = 0.4;
const NOISE_FLOOR_DB: f32 = -90.0;
const NOISE_SPREAD_DB: f32 = 6.0;
const PEAK_DB: f32 = -10.0;
const NOISE_AMPLITUDE: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChirpSource {
    total_samples: u64,
    pulse_period: u64,
    duty: f64,
    sweep_length: u64,
}

impl ChirpSource {
    pub fn new(total_samples: u64, pulse_period: u64, duty: f64, sweep_length: u64) -> Self {
        Self {
            total_samples,
            pulse_period: pulse_period.max(1),
            duty: duty.clamp(0.0, 1.0),
            sweep_length: sweep_length.max(1),
        }
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn pulse_period(&self) -> u64 {
        self.pulse_period
    }

    pub fn is_on(&self, sample: u64) -> bool {
        let on_length = (self.pulse_period as f64 * self.duty) as u64;
        sample % self.pulse_period < on_length
    }

    /// Instantaneous frequency in cycles per sample.
    pub fn frequency_at(&self, sample: u64) -> f64 {
        let t = (sample % self.sweep_length) as f64;
        -SWEEP_EXTENT + 2.0 * SWEEP_EXTENT * t / self.sweep_length as f64
    }

    /// Power rows for `address`, bins ordered from `-fs/2` to `+fs/2`.
    pub fn tile_rows(&self, address: TileAddress) -> Vec<f32> {
        let fft_size = address.fft_size.max(1) as usize;
        let rows = address.row_count_for(self.total_samples) as usize;
        let width = (fft_size as f64 / 256.0).max(1.5);
        let mut values = Vec::with_capacity(rows * fft_size);
        for row in 0..rows {
            let sample = address.sample_start + row as u64 * u64::from(address.stride.max(1));
            let peak_bin = (self.frequency_at(sample) + 0.5) * fft_size as f64;
            let on = self.is_on(sample);
            for bin in 0..fft_size {
                let noise = NOISE_FLOOR_DB + NOISE_SPREAD_DB * dither(sample ^ (bin as u64) << 40);
                let power = if on {
                    let distance = (bin as f64 - peak_bin) / width;
                    let tone = 10f64.powf(f64::from(PEAK_DB) / 10.0) * (-0.5 * distance * distance).exp();
                    let floor = 10f64.powf(f64::from(noise) / 10.0);
                    (10.0 * (tone + floor).log10()) as f32
                } else {
                    noise
                };
                values.push(power);
            }
        }
        values
    }

    /// Interleaved IQ for `request`, truncated at the end of the data.
    pub fn samples(&self, request: SampleRequest) -> Vec<f32> {
        let stride = u64::from(request.stride.max(1));
        let end = request.start.saturating_add(request.length).min(self.total_samples);
        let mut buffer = Vec::with_capacity(request.expected_buffer_len() as usize);
        let mut sample = request.start;
        while sample < end {
            if self.is_on(sample) {
                let phase = self.phase_at(sample);
                buffer.push(phase.cos() as f32);
                buffer.push(phase.sin() as f32);
            } else {
                buffer.push(NOISE_AMPLITUDE * (dither(sample) - 0.5));
                buffer.push(NOISE_AMPLITUDE * (dither(!sample) - 0.5));
            }
            sample += stride;
        }
        buffer
    }

    fn phase_at(&self, sample: u64) -> f64 {
        let t = (sample % self.sweep_length) as f64;
        let rate = 2.0 * SWEEP_EXTENT / self.sweep_length as f64;
        TAU * (-SWEEP_EXTENT * t + 0.5 * rate * t * t)
    }
}

impl TileSource for ChirpSource {
    fn fetch_tile(
        &self,
        request: TileRequest,
    ) -> impl Future<Output = Result<Vec<f32>, FetchError>> {
        let address = TileAddress::from(request);
        let result = if address.sample_start >= self.total_samples {
            Err(FetchError::Unavailable)
        } else {
            Ok(self.tile_rows(address))
        };
        ready(result)
    }
}

impl SampleSource for ChirpSource {
    fn fetch_samples(
        &self,
        request: SampleRequest,
    ) -> impl Future<Output = Result<Vec<f32>, FetchError>> {
        ready(Ok(self.samples(request)))
    }
}

/// Uniform value in `[0, 1)` derived from `seed` (splitmix64 finalizer).
fn dither(seed: u64) -> f32 {
    let mut z = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    (z >> 40) as f32 / (1u64 << 24) as f32
}
