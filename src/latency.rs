use std::time::Duration;

use tdigest::TDigest;
use tracing::info;

/// Collects per-query durations in microseconds.
#[derive(Clone, Debug, Default)]
pub struct LatencyReport {
    durations_micros: Vec<f64>,
}

impl LatencyReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, duration: Duration) {
        self.durations_micros.push(duration.as_micros() as f64);
    }

    pub fn len(&self) -> usize {
        self.durations_micros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations_micros.is_empty()
    }

    pub fn percentile_in_micros(&self, q: f64) -> f64 {
        let digest = TDigest::new_with_size(100);
        digest
            .merge_unsorted(self.durations_micros.clone())
            .estimate_quantile(q)
    }

    pub fn log(&self, name: &str) {
        if self.is_empty() {
            return;
        }
        info!(
            "{} latency over {} queries (micros): p50={:.0} p90={:.0} p99={:.0}",
            name,
            self.len(),
            self.percentile_in_micros(0.5),
            self.percentile_in_micros(0.9),
            self.percentile_in_micros(0.99),
        );
    }
}

impl Extend<Duration> for LatencyReport {
    fn extend<T: IntoIterator<Item = Duration>>(&mut self, iter: T) {
        for duration in iter {
            self.record(duration);
        }
    }
}
