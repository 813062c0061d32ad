use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Counters shared between the processing chain and the telemetry bridge.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub segments_filtered: usize,
    pub spectra_emitted: usize,
    pub rows_recorded: usize,
    pub bytes_flushed: usize,
    pub errors: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_segment(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.segments_filtered += 1;
        }
    }

    pub fn record_spectrum(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.spectra_emitted += 1;
        }
    }

    pub fn record_rows(&self, rows: usize, bytes: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.rows_recorded += rows;
            metrics.bytes_flushed += bytes;
        }
    }

    pub fn record_error(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.errors += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
