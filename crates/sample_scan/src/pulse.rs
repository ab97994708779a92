use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use render_protocol::{SampleRequest, SampleSource};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseScanConfig {
    /// Raw samples between two scanned samples.
    pub scan_stride: u32,
    /// Scanned samples per fetch.
    pub scan_chunk: u32,
    /// Fetches before a scan gives up.
    pub max_chunks: u32,
}

impl Default for PulseScanConfig {
    fn default() -> Self {
        Self {
            scan_stride: 512,
            scan_chunk: 4096,
            max_chunks: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Backward,
}

/// Cooperative cancellation shared between a running scan and whoever may stop it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Instantaneous power `I² + Q²` of complex sample `index` in an interleaved buffer.
pub fn sample_power(buffer: &[f32], index: usize) -> f32 {
    let i = buffer[index * 2];
    let q = buffer[index * 2 + 1];
    i * i + q * q
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwardState {
    SkipSignal,
    FindSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackwardState {
    SkipSignal,
    FindEnd,
    FindStart,
}

/// Finds where the signal next rises above a power threshold.
#[derive(Debug, Clone, Default)]
pub struct PulseScanner {
    config: PulseScanConfig,
}

impl PulseScanner {
    pub fn new(config: PulseScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> PulseScanConfig {
        self.config
    }

    /// Sample index where the next pulse (forward) or previous pulse (backward)
    /// starts, scanning every `scan_stride`th sample from `start`.
    ///
    /// A scan that starts inside a pulse first skips past it. Returns `None` when
    /// the chunk budget runs out, a data boundary is hit, a fetch fails or `cancel`
    /// is set. Backward scans that run into sample 0 while inside a pulse report 0.
    pub async fn find_next_pulse<S: SampleSource>(
        &self,
        source: &S,
        start: u64,
        direction: ScanDirection,
        total_samples: u64,
        threshold: f32,
        cancel: &CancelFlag,
    ) -> Option<u64> {
        match direction {
            ScanDirection::Forward => {
                self.scan_forward(source, start, total_samples, threshold, cancel)
                    .await
            }
            ScanDirection::Backward => {
                self.scan_backward(source, start, total_samples, threshold, cancel)
                    .await
            }
        }
    }

    async fn scan_forward<S: SampleSource>(
        &self,
        source: &S,
        start: u64,
        total_samples: u64,
        threshold: f32,
        cancel: &CancelFlag,
    ) -> Option<u64> {
        let stride = u64::from(self.config.scan_stride.max(1));
        let chunk = u64::from(self.config.scan_chunk.max(1));
        let mut position = start;
        let mut state = ForwardState::SkipSignal;

        for chunk_index in 0..self.config.max_chunks {
            if position >= total_samples || cancel.is_cancelled() {
                return None;
            }
            let count = chunk.min((total_samples - position).div_ceil(stride));
            let request = SampleRequest {
                start: position,
                length: (count * stride).min(total_samples - position),
                stride: stride as u32,
            };
            let buffer = self.fetch(source, request).await?;
            let available = (buffer.len() / 2).min(count as usize);
            tracing::debug!(chunk_index, position, available, "forward pulse scan chunk");
            if available == 0 {
                return None;
            }

            for index in 0..available {
                let power = sample_power(&buffer, index);
                match state {
                    ForwardState::SkipSignal if power < threshold => {
                        state = ForwardState::FindSignal;
                    }
                    ForwardState::FindSignal if power >= threshold => {
                        return Some(position + index as u64 * stride);
                    }
                    _ => {}
                }
            }
            position += count * stride;
        }
        None
    }

    async fn scan_backward<S: SampleSource>(
        &self,
        source: &S,
        start: u64,
        total_samples: u64,
        threshold: f32,
        cancel: &CancelFlag,
    ) -> Option<u64> {
        if total_samples == 0 {
            return None;
        }
        let stride = u64::from(self.config.scan_stride.max(1));
        let chunk = u64::from(self.config.scan_chunk.max(1));
        // Highest sample still to scan, inclusive.
        let mut cursor = start.min(total_samples - 1);
        let mut state = BackwardState::SkipSignal;

        for chunk_index in 0..self.config.max_chunks {
            if cancel.is_cancelled() {
                return None;
            }
            let count = chunk.min(cursor / stride + 1);
            let fetch_start = cursor - (count - 1) * stride;
            let request = SampleRequest {
                start: fetch_start,
                length: (count - 1) * stride + 1,
                stride: stride as u32,
            };
            let buffer = self.fetch(source, request).await?;
            let available = (buffer.len() / 2).min(count as usize);
            tracing::debug!(chunk_index, fetch_start, available, "backward pulse scan chunk");

            for index in (0..available).rev() {
                let position = fetch_start + index as u64 * stride;
                let power = sample_power(&buffer, index);
                match state {
                    BackwardState::SkipSignal if power < threshold => {
                        state = BackwardState::FindEnd;
                    }
                    BackwardState::FindEnd if power >= threshold => {
                        state = BackwardState::FindStart;
                    }
                    BackwardState::FindStart if power < threshold => {
                        return Some(position + stride);
                    }
                    _ => {}
                }
            }

            if fetch_start < stride {
                return (state == BackwardState::FindStart).then_some(0);
            }
            cursor = fetch_start - stride;
        }
        None
    }

    async fn fetch<S: SampleSource>(&self, source: &S, request: SampleRequest) -> Option<Vec<f32>> {
        match source.fetch_samples(request).await {
            Ok(buffer) => Some(buffer),
            Err(error) => {
                tracing::warn!(start = request.start, length = request.length, %error, "pulse scan fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::future::Future;

    use futures::executor::block_on;
    use render_protocol::FetchError;

    use super::*;

    const THRESHOLD: f32 = 0.5;

    /// Unit-amplitude pulses over `[start, end)` ranges, silence elsewhere.
    struct PulseTrain {
        total: u64,
        pulses: Vec<(u64, u64)>,
        fetches: Cell<u32>,
        cancel_after: Option<(u32, CancelFlag)>,
    }

    impl PulseTrain {
        fn new(total: u64, pulses: &[(u64, u64)]) -> Self {
            Self {
                total,
                pulses: pulses.to_vec(),
                fetches: Cell::new(0),
                cancel_after: None,
            }
        }

        fn amplitude(&self, sample: u64) -> f32 {
            let loud = self
                .pulses
                .iter()
                .any(|&(start, end)| (start..end).contains(&sample));
            if loud { 1.0 } else { 0.0 }
        }
    }

    impl SampleSource for PulseTrain {
        fn fetch_samples(
            &self,
            request: SampleRequest,
        ) -> impl Future<Output = Result<Vec<f32>, FetchError>> {
            self.fetches.set(self.fetches.get() + 1);
            if let Some((after, flag)) = &self.cancel_after {
                if self.fetches.get() >= *after {
                    flag.cancel();
                }
            }
            let stride = u64::from(request.stride.max(1));
            let end = (request.start + request.length).min(self.total);
            let mut buffer = Vec::new();
            let mut sample = request.start;
            while sample < end {
                buffer.push(self.amplitude(sample));
                buffer.push(0.0);
                sample += stride;
            }
            futures::future::ready(Ok(buffer))
        }
    }

    struct Broken;

    impl SampleSource for Broken {
        fn fetch_samples(
            &self,
            _request: SampleRequest,
        ) -> impl Future<Output = Result<Vec<f32>, FetchError>> {
            futures::future::ready(Err(FetchError::Failed("closed".into())))
        }
    }

    fn fine_scanner() -> PulseScanner {
        PulseScanner::new(PulseScanConfig {
            scan_stride: 1,
            scan_chunk: 256,
            max_chunks: 50,
        })
    }

    fn scan(
        scanner: &PulseScanner,
        source: &PulseTrain,
        start: u64,
        direction: ScanDirection,
    ) -> Option<u64> {
        block_on(scanner.find_next_pulse(
            source,
            start,
            direction,
            source.total,
            THRESHOLD,
            &CancelFlag::new(),
        ))
    }

    fn two_pulses() -> PulseTrain {
        PulseTrain::new(10_000, &[(1000, 1200), (5000, 5300)])
    }

    #[test]
    fn forward_from_silence_finds_first_pulse() {
        assert_eq!(scan(&fine_scanner(), &two_pulses(), 0, ScanDirection::Forward), Some(1000));
    }

    #[test]
    fn forward_from_inside_pulse_skips_to_next() {
        assert_eq!(
            scan(&fine_scanner(), &two_pulses(), 1100, ScanDirection::Forward),
            Some(5000)
        );
    }

    #[test]
    fn backward_from_pulse_end_finds_its_start() {
        assert_eq!(
            scan(&fine_scanner(), &two_pulses(), 5300, ScanDirection::Backward),
            Some(5000)
        );
    }

    #[test]
    fn backward_before_any_pulse_finds_nothing() {
        assert_eq!(scan(&fine_scanner(), &two_pulses(), 900, ScanDirection::Backward), None);
    }

    #[test]
    fn forward_past_last_pulse_reaches_end_of_data() {
        assert_eq!(scan(&fine_scanner(), &two_pulses(), 5400, ScanDirection::Forward), None);
        assert_eq!(scan(&fine_scanner(), &two_pulses(), 20_000, ScanDirection::Forward), None);
    }

    #[test]
    fn backward_into_pulse_at_origin_reports_zero() {
        let source = PulseTrain::new(4000, &[(0, 300)]);
        assert_eq!(scan(&fine_scanner(), &source, 2000, ScanDirection::Backward), Some(0));
    }

    #[test]
    fn strided_scan_lands_on_stride_grid() {
        let scanner = PulseScanner::new(PulseScanConfig {
            scan_stride: 16,
            scan_chunk: 32,
            max_chunks: 50,
        });
        let source = PulseTrain::new(100_000, &[(20_000, 24_000), (60_008, 61_000)]);
        assert_eq!(scan(&scanner, &source, 0, ScanDirection::Forward), Some(20_000));
        assert_eq!(scan(&scanner, &source, 70_000, ScanDirection::Backward), Some(60_016));
    }

    #[test]
    fn chunk_budget_bounds_the_scan() {
        let scanner = PulseScanner::new(PulseScanConfig {
            scan_stride: 1,
            scan_chunk: 100,
            max_chunks: 3,
        });
        let source = two_pulses();
        assert_eq!(scan(&scanner, &source, 0, ScanDirection::Forward), None);
        assert_eq!(source.fetches.get(), 3);
    }

    #[test]
    fn cancellation_stops_before_next_fetch() {
        let flag = CancelFlag::new();
        let mut source = two_pulses();
        source.cancel_after = Some((2, flag.clone()));
        let result = block_on(fine_scanner().find_next_pulse(
            &source,
            0,
            ScanDirection::Forward,
            source.total,
            THRESHOLD,
            &flag,
        ));
        assert_eq!(result, None);
        assert_eq!(source.fetches.get(), 2);
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!flag.is_cancelled());
    }

    #[test]
    fn fetch_failure_reads_as_not_found() {
        let result = block_on(fine_scanner().find_next_pulse(
            &Broken,
            0,
            ScanDirection::Backward,
            10_000,
            THRESHOLD,
            &CancelFlag::new(),
        ));
        assert_eq!(result, None);
    }
}
