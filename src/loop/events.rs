//! Semantic events emitted by the loop controller.
//!
//! The controller never formats log lines itself. It reports what happened as
//! a [`LoopEvent`] to an injected [`EventSink`]; [`TracingSink`] turns those
//! into leveled `tracing` events with structured fields.

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::outcome::{IterationOutcome, PromiseSignals};
use super::state::LoopStatus;
use super::stats::IterationStats;

/// Why a run was aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Consecutive failures reached the configured threshold.
    FailureThreshold { threshold: u32, count: u32 },
    /// The prompt for the next iteration could not be assembled.
    PromptAssembly(String),
    /// The agent could not be started or waited on.
    Execution(String),
    /// The agent command could not be parsed.
    InvalidCommand(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::FailureThreshold { threshold, count } => write!(
                f,
                "failure threshold reached ({} consecutive failures, threshold {})",
                count, threshold
            ),
            AbortReason::PromptAssembly(msg) => write!(f, "prompt assembly failed: {}", msg),
            AbortReason::Execution(msg) => write!(f, "execution failed: {}", msg),
            AbortReason::InvalidCommand(msg) => write!(f, "invalid AI command: {}", msg),
        }
    }
}

/// Something the loop did that is worth reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    RunStarted {
        procedure: String,
        max_iterations: Option<u32>,
        timeout_secs: Option<u64>,
        failure_threshold: u32,
    },
    /// `index` is zero-based.
    IterationStarted {
        index: u32,
        max_iterations: Option<u32>,
        prompt_len: usize,
    },
    IterationCompleted {
        index: u32,
        outcome: IterationOutcome,
        exit_code: i32,
        signals: PromiseSignals,
        elapsed: Duration,
        consecutive_failures: u32,
        truncated: bool,
    },
    IterationTimedOut {
        index: u32,
        timeout_secs: u64,
        elapsed: Duration,
        consecutive_failures: u32,
    },
    Aborted {
        index: u32,
        reason: AbortReason,
    },
    Interrupted {
        index: u32,
    },
    RunFinished {
        status: LoopStatus,
        iterations: u32,
        elapsed: Duration,
        stats: IterationStats,
    },
}

/// Receiver of loop events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LoopEvent);
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingSink {
    fn emit(&self, event: &LoopEvent) {
        match event {
            LoopEvent::RunStarted {
                procedure,
                max_iterations,
                timeout_secs,
                failure_threshold,
            } => {
                info!(
                    procedure = %procedure,
                    max_iterations = ?max_iterations,
                    timeout_secs = ?timeout_secs,
                    failure_threshold,
                    "Starting procedure"
                );
            }
            LoopEvent::IterationStarted {
                index,
                max_iterations,
                prompt_len,
            } => {
                let progress = match max_iterations {
                    Some(max) => format!("{}/{}", index + 1, max),
                    None => format!("{} (unlimited)", index + 1),
                };
                info!(iteration = index + 1, prompt_len, "Iteration {} started", progress);
            }
            LoopEvent::IterationCompleted {
                index,
                outcome,
                exit_code,
                signals,
                elapsed,
                consecutive_failures,
                truncated,
            } => {
                if *truncated {
                    debug!(iteration = index + 1, "Agent output truncated to buffer limit");
                }
                let secs = elapsed.as_secs_f64();
                match outcome {
                    IterationOutcome::JobDone => info!(
                        iteration = index + 1,
                        exit_code,
                        elapsed_secs = secs,
                        "Agent signaled SUCCESS"
                    ),
                    IterationOutcome::Failure if signals.failure => warn!(
                        iteration = index + 1,
                        exit_code,
                        elapsed_secs = secs,
                        consecutive_failures,
                        "Agent signaled FAILURE"
                    ),
                    IterationOutcome::Failure => warn!(
                        iteration = index + 1,
                        exit_code,
                        elapsed_secs = secs,
                        consecutive_failures,
                        "Agent exited with non-zero status"
                    ),
                    IterationOutcome::Success => info!(
                        iteration = index + 1,
                        exit_code,
                        elapsed_secs = secs,
                        "Iteration completed"
                    ),
                }
            }
            LoopEvent::IterationTimedOut {
                index,
                timeout_secs,
                elapsed,
                consecutive_failures,
            } => {
                warn!(
                    iteration = index + 1,
                    timeout_secs,
                    elapsed_secs = elapsed.as_secs_f64(),
                    consecutive_failures,
                    "Iteration timed out"
                );
            }
            LoopEvent::Aborted { index, reason } => {
                error!(iteration = index + 1, "Aborting: {}", reason);
            }
            LoopEvent::Interrupted { index } => {
                info!(iteration = index + 1, "Interrupted, stopping");
            }
            LoopEvent::RunFinished {
                status,
                iterations,
                elapsed,
                stats,
            } => {
                info!(
                    status = %status,
                    iterations,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Loop finished"
                );
                if !stats.is_empty() {
                    info!("Iteration timing: {}", stats);
                }
            }
        }
    }
}
