//! Consumers of the raw sample source: pulse scanning and the trace window.

mod pulse;
pub mod trace;

pub use pulse::{CancelFlag, PulseScanConfig, PulseScanner, ScanDirection, sample_power};
pub use trace::TraceWindow;
