use std::sync::Mutex;

use serde::Serialize;

/// Per-run counters of the ingestion loop.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub processed: usize,
    pub failed: usize,
    pub cycles: u64,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_processed(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.processed += 1;
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.failed += 1;
        }
    }

    pub fn record_cycle(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.cycles += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|m| *m).unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsRecorder::new();
        metrics.record_processed();
        metrics.record_failure();
        metrics.record_failure();
        metrics.record_cycle();
        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                processed: 1,
                failed: 2,
                cycles: 1
            }
        );
    }
}
