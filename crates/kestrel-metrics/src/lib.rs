//! Latency tracking for the submit path.
//!
//! Per-thread HdrHistograms that are merged once the workers are joined,
//! plus a raw TSC stopwatch that is cheap enough to wrap every submission.

use hdrhistogram::{CreationError, Histogram};

/// High-precision latency histogram.
#[derive(Clone, Debug)]
pub struct LatencyHistogram {
    histogram: Histogram<u64>,
}

impl LatencyHistogram {
    /// Create a new histogram with 3 significant digits.
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("3 significant figures is always valid"),
        }
    }

    /// Create with custom precision (0-5 significant digits).
    pub fn with_precision(sigfig: u8) -> Result<Self, CreationError> {
        Ok(Self { histogram: Histogram::new(sigfig)? })
    }

    /// Record a latency value in nanoseconds.
    #[inline(always)]
    pub fn record(&mut self, nanos: u64) {
        // `record` grows the range as needed; clamp only if growth fails.
        if self.histogram.record(nanos).is_err() {
            self.histogram.saturating_record(nanos);
        }
    }

    /// Fold another histogram (e.g. another worker's) into this one.
    pub fn merge(&mut self, other: &LatencyHistogram) {
        // Auto-resizing histograms cannot fail to add.
        let _ = self.histogram.add(&other.histogram);
    }

    /// Get value at percentile (0.0 - 100.0).
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        self.histogram.value_at_quantile(percentile / 100.0)
    }

    /// Get P50 (median) latency.
    pub fn p50(&self) -> u64 {
        self.value_at_percentile(50.0)
    }

    /// Get P99 latency.
    pub fn p99(&self) -> u64 {
        self.value_at_percentile(99.0)
    }

    /// Get P99.9 latency.
    pub fn p999(&self) -> u64 {
        self.value_at_percentile(99.9)
    }

    /// Get maximum latency.
    pub fn max(&self) -> u64 {
        self.histogram.max()
    }

    /// Get minimum latency.
    pub fn min(&self) -> u64 {
        self.histogram.min()
    }

    /// Get mean latency.
    pub fn mean(&self) -> f64 {
        self.histogram.mean()
    }

    /// Get total count of recorded values.
    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    /// Multi-line percentile summary, each line starting with `prefix`.
    pub fn summary(&self, prefix: &str) -> String {
        let rows = [
            ("P50", self.p50()),
            ("P99", self.p99()),
            ("P99.9", self.p999()),
            ("Max", self.max()),
        ];
        rows.iter()
            .map(|(label, nanos)| format!("{prefix}{label:<6} {:>12}", Self::format_latency(*nanos)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Format latency with appropriate units.
    pub fn format_latency(nanos: u64) -> String {
        if nanos < 1_000 {
            format!("{} ns", nanos)
        } else if nanos < 1_000_000 {
            format!("{:.2} μs", nanos as f64 / 1_000.0)
        } else if nanos < 1_000_000_000 {
            format!("{:.2} ms", nanos as f64 / 1_000_000.0)
        } else {
            format!("{:.2} s", nanos as f64 / 1_000_000_000.0)
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// TSC-based stopwatch for per-call timing.
#[derive(Clone, Debug)]
pub struct Stopwatch {
    clock: quanta::Clock,
}

impl Stopwatch {
    /// Create a new stopwatch.
    pub fn new() -> Self {
        Self::from_clock(quanta::Clock::new())
    }

    /// Use an existing (possibly mocked) clock.
    pub fn from_clock(clock: quanta::Clock) -> Self {
        Self { clock }
    }

    /// Raw start mark.
    #[inline(always)]
    pub fn start(&self) -> u64 {
        self.clock.raw()
    }

    /// Nanoseconds since `start`.
    #[inline(always)]
    pub fn elapsed_nanos(&self, start: u64) -> u64 {
        self.clock.delta_as_nanos(start, self.clock.raw())
    }

    /// Time `f` and record its duration into `histogram`.
    #[inline(always)]
    pub fn record<T>(&self, histogram: &mut LatencyHistogram, f: impl FnOnce() -> T) -> T {
        let start = self.start();
        let out = f();
        histogram.record(self.elapsed_nanos(start));
        out
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}
