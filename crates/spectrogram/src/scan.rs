//! Pulse scans run on their own thread so the host stays responsive and can cancel.

use std::io;
use std::thread::{self, JoinHandle};

use render_protocol::SampleSource;
use sample_scan::{CancelFlag, PulseScanner, ScanDirection};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseScanRequest {
    pub start: u64,
    pub direction: ScanDirection,
    pub total_samples: u64,
    pub threshold: f32,
}

/// A running pulse scan. Dropping the task detaches the thread without cancelling it.
pub struct PulseScanTask {
    cancel: CancelFlag,
    thread: JoinHandle<()>,
}

impl PulseScanTask {
    /// Starts scanning `source` and calls `on_done` from the scan thread with the
    /// result. A cancelled scan reports `None`.
    pub fn spawn<S, F>(
        scanner: PulseScanner,
        source: S,
        request: PulseScanRequest,
        on_done: F,
    ) -> io::Result<Self>
    where
        S: SampleSource + Send + 'static,
        F: FnOnce(Option<u64>) + Send + 'static,
    {
        let cancel = CancelFlag::new();
        let scan_cancel = cancel.clone();
        let thread = thread::Builder::new()
            .name("pulse_scan".to_owned())
            .spawn(move || {
                let found = futures::executor::block_on(scanner.find_next_pulse(
                    &source,
                    request.start,
                    request.direction,
                    request.total_samples,
                    request.threshold,
                    &scan_cancel,
                ));
                if scan_cancel.is_cancelled() {
                    tracing::debug!(direction = ?request.direction, "pulse scan cancelled");
                }
                on_done(found);
            })?;
        Ok(Self { cancel, thread })
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the scan thread. `false` if it panicked.
    pub fn join(self) -> bool {
        self.thread.join().is_ok()
    }
}
