//! Constant-memory iteration timing statistics.
//!
//! Durations are folded in one at a time using Welford's online algorithm, so
//! a run of ten thousand iterations costs the same memory as a run of one.
//! Variance is the population variance (divide by `count`): the figure is
//! informational only and is reported alongside the sample count.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Online accumulator of iteration durations.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rooda::r#loop::stats::IterationStats;
///
/// let mut stats = IterationStats::default();
/// stats.record(Duration::from_secs(2));
/// stats.record(Duration::from_secs(4));
///
/// assert_eq!(stats.count(), 2);
/// assert_eq!(stats.mean(), Duration::from_secs(3));
/// assert_eq!(stats.stddev(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    count: u64,
    total: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
    /// Running mean in seconds.
    mean_secs: f64,
    /// Sum of squared differences from the running mean, in seconds².
    m2: f64,
}

impl IterationStats {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one duration into the statistics.
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total += duration;
        self.min = Some(self.min.map_or(duration, |m| m.min(duration)));
        self.max = Some(self.max.map_or(duration, |m| m.max(duration)));

        let x = duration.as_secs_f64();
        let delta = x - self.mean_secs;
        self.mean_secs += delta / self.count as f64;
        self.m2 += delta * (x - self.mean_secs);
    }

    /// Number of recorded samples.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of all recorded durations.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.total
    }

    /// Shortest recorded duration, if any.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        self.min
    }

    /// Longest recorded duration, if any.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        self.max
    }

    /// Arithmetic mean, zero when nothing has been recorded.
    #[must_use]
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total / u32::try_from(self.count).unwrap_or(u32::MAX)
    }

    /// Population standard deviation, zero for fewer than two samples.
    #[must_use]
    pub fn stddev(&self) -> Duration {
        if self.count < 2 {
            return Duration::ZERO;
        }
        let variance = (self.m2 / self.count as f64).max(0.0);
        Duration::from_secs_f64(variance.sqrt())
    }

    /// Whether no samples have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl std::fmt::Display for IterationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (Some(min), Some(max)) = (self.min, self.max) else {
            return write!(f, "no iterations recorded");
        };
        write!(
            f,
            "count={} min={:.3}s max={:.3}s mean={:.3}s",
            self.count,
            min.as_secs_f64(),
            max.as_secs_f64(),
            self.mean().as_secs_f64()
        )?;
        if self.count >= 2 {
            write!(f, " stddev={:.3}s", self.stddev().as_secs_f64())?;
        }
        Ok(())
    }
}
