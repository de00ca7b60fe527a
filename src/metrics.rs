//! Throughput metrics: a wall-clock window plus a candidate counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Owned metrics handle threaded through a run.
///
/// The counter is atomic so sinks and the scheduler can share a `&Metrics`
/// without coordination; the clock window is owned by whoever drives the
/// run and stops it once at shutdown.
#[derive(Debug)]
pub struct Metrics {
    started: Instant,
    stopped: Option<Instant>,
    hashed: AtomicU64,
}

impl Metrics {
    /// Start a new measurement window.
    pub fn start() -> Self {
        Metrics {
            started: Instant::now(),
            stopped: None,
            hashed: AtomicU64::new(0),
        }
    }

    /// Record `count` submitted candidates.
    pub fn increment(&self, count: u64) {
        self.hashed.fetch_add(count, Ordering::Relaxed);
    }

    /// Total candidates recorded so far.
    pub fn total(&self) -> u64 {
        self.hashed.load(Ordering::Acquire)
    }

    /// Close the measurement window. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped.is_none() {
            self.stopped = Some(Instant::now());
        }
    }

    /// Width of the window, up to now if still open.
    pub fn elapsed(&self) -> Duration {
        self.stopped.unwrap_or_else(Instant::now) - self.started
    }

    /// Average rate over the window.
    pub fn hashes_per_second(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total() as f64 / secs
    }
}

/// Format a count with thousands separators for the run summary.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
