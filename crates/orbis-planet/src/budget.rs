//! Wall-clock budget for time-slicing the tile traversal.

use std::time::{Duration, Instant};

/// A slice of wall-clock time started when the budget is created.
#[derive(Debug, Clone, Copy)]
pub struct FrameBudget {
    started: Instant,
    limit: Duration,
}

impl FrameBudget {
    pub fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// Budget from a millisecond value; negative or NaN becomes zero, values
    /// past what a [`Duration`] holds saturate.
    pub fn from_millis_f64(ms: f64) -> Self {
        let limit = if ms.is_nan() || ms <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX)
        };
        Self::start(limit)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_exhausted(&self) -> bool {
        self.elapsed() >= self.limit
    }
}
