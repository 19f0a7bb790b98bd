use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Callback invoked with `(upload id, bytes written so far, total bytes)`.
///
/// "Bytes written" is the absolute file position, cumulative across
/// PATCH requests and resumed attempts.
pub type ProgressCallback = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct PositionSample {
    position: u64,
    timestamp: Instant,
}

/// Estimates transfer rate from cumulative positions over a sliding window.
///
/// Positions can move backwards when an upload restarts at a lower offset;
/// the window is cleared when that happens.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<PositionSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for rate calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100).max(2),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    /// Records the position reached at the current instant.
    pub fn observe(&self, position: u64) {
        self.observe_at(position, Instant::now());
    }

    fn observe_at(&self, position: u64, now: Instant) {
        let mut s = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if s.samples.last().is_some_and(|last| position < last.position) {
            s.samples.clear();
        }
        s.samples.push(PositionSample {
            position,
            timestamp: now,
        });

        let window = s.window_size;
        s.samples
            .retain(|sample| now.duration_since(sample.timestamp) <= window);

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Returns the rate in bytes/second within the window.
    ///
    /// Returns 0.0 with fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let (Some(first), Some(last)) = (s.samples.first(), s.samples.last()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }
        (last.position - first.position) as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time left to reach `total_bytes` from the last position.
    ///
    /// Returns `None` while the rate is zero.
    pub fn eta(&self, total_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        let position = {
            let s = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            s.samples.last().map_or(0, |sample| sample.position)
        };
        let remaining = total_bytes.saturating_sub(position);
        Some(Duration::from_secs_f64(remaining as f64 / speed))
    }

    /// Clears all recorded samples.
    pub fn reset(&self) {
        let mut s = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        s.samples.clear();
    }
}
