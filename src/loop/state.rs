//! Run state owned by the loop controller.
//!
//! [`IterationState`] is created once per run and mutated only by the
//! controller. Its [`LoopStatus`] starts as `Running` and moves to exactly one
//! terminal value; later attempts to change it are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stats::IterationStats;
use crate::error::EXIT_USER_ERROR;

/// Lifecycle status of a run.
///
/// # Example
///
/// ```
/// use rooda::r#loop::state::LoopStatus;
///
/// assert!(!LoopStatus::Running.is_terminal());
/// assert_eq!(LoopStatus::MaxIters.exit_code(), 0);
/// assert_eq!(LoopStatus::Aborted.exit_code(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopStatus {
    /// Iterations are still being driven.
    Running,
    /// The agent emitted the success promise.
    Success,
    /// The iteration bound was reached.
    MaxIters,
    /// Failure threshold reached or a fatal error occurred.
    Aborted,
    /// A shutdown signal arrived.
    Interrupted,
}

impl LoopStatus {
    /// Whether this status ends the run.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != LoopStatus::Running
    }

    /// Process exit code for a finished run.
    ///
    /// Hitting the iteration bound and a user interrupt are not errors.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            LoopStatus::Aborted => EXIT_USER_ERROR,
            LoopStatus::Running
            | LoopStatus::Success
            | LoopStatus::MaxIters
            | LoopStatus::Interrupted => 0,
        }
    }
}

impl std::fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopStatus::Running => write!(f, "running"),
            LoopStatus::Success => write!(f, "success"),
            LoopStatus::MaxIters => write!(f, "max-iters"),
            LoopStatus::Aborted => write!(f, "aborted"),
            LoopStatus::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Mutable state for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationState {
    /// Number of iterations completed so far (0-based index of the next one).
    pub iteration: u32,
    /// Iteration bound; `None` means unlimited.
    pub max_iterations: Option<u32>,
    /// Per-iteration timeout in seconds; `None` means no timeout.
    pub iteration_timeout: Option<u64>,
    /// Output capture limit in bytes.
    pub max_output_buffer: usize,
    /// Back-to-back non-clean outcomes.
    pub consecutive_failures: u32,
    /// Consecutive failures at which the run aborts.
    pub failure_threshold: u32,
    pub started_at: DateTime<Utc>,
    pub procedure_name: String,
    pub stats: IterationStats,
    status: LoopStatus,
}

impl IterationState {
    /// Create a `Running` state for the named procedure.
    ///
    /// Defaults: five iterations, no timeout, 10 MiB of output, threshold 3.
    #[must_use]
    pub fn new(procedure_name: impl Into<String>) -> Self {
        Self {
            iteration: 0,
            max_iterations: Some(5),
            iteration_timeout: None,
            max_output_buffer: 10 * 1024 * 1024,
            consecutive_failures: 0,
            failure_threshold: 3,
            started_at: Utc::now(),
            procedure_name: procedure_name.into(),
            stats: IterationStats::default(),
            status: LoopStatus::Running,
        }
    }

    /// Set the iteration bound.
    #[must_use]
    pub fn with_max_iterations(mut self, max: Option<u32>) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the per-iteration timeout.
    #[must_use]
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.iteration_timeout = secs;
        self
    }

    /// Set the output capture limit.
    #[must_use]
    pub fn with_max_output_buffer(mut self, bytes: usize) -> Self {
        self.max_output_buffer = bytes;
        self
    }

    /// Set the failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    #[must_use]
    pub fn status(&self) -> LoopStatus {
        self.status
    }

    /// Move to a terminal status. Returns `false` if the state was already
    /// terminal, in which case nothing changes.
    pub fn finish(&mut self, status: LoopStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }

    /// Whether the iteration bound has been reached.
    #[must_use]
    pub fn reached_max_iterations(&self) -> bool {
        self.max_iterations.is_some_and(|max| self.iteration >= max)
    }

    /// Whether consecutive failures have reached the threshold.
    #[must_use]
    pub fn reached_failure_threshold(&self) -> bool {
        self.consecutive_failures >= self.failure_threshold
    }

    /// Count a failed or timed-out iteration.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    /// Count a clean iteration.
    pub fn record_clean(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Move to the next iteration index.
    pub fn advance(&mut self) {
        self.iteration += 1;
    }

    /// Wall-clock time since the run started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    /// One-line summary: `status=success iterations=2 total_elapsed=3.142s`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "status={} iterations={} total_elapsed={:.3}s",
            self.status,
            self.iteration,
            self.elapsed().as_secs_f64()
        )
    }
}
