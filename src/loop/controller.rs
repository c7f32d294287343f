//! The iteration loop.
//!
//! [`LoopController`] drives one run: it asks the prompt assembler for text,
//! hands it to the agent runner, classifies what came back and updates the
//! run's [`IterationState`] until a terminal [`LoopStatus`] is reached.
//!
//! Each pass checks, in order:
//!
//! 1. iteration bound reached: `MaxIters`
//! 2. consecutive failures at threshold: `Aborted`
//! 3. assemble the prompt and execute the agent
//! 4. interrupted: `Interrupted`, counters untouched
//! 5. timed out: count a failure, record the duration, continue
//! 6. spawn or wait error: `Aborted`
//! 7. classify the output: `JobDone` ends with `Success`, `Failure` counts a
//!    failure, a clean exit resets the failure counter
//!
//! Iterations never overlap. The agent may edit the working tree, so the next
//! one starts only after the previous process has been reaped.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::events::{AbortReason, EventSink, LoopEvent, TracingSink};
use super::outcome::{classify, scan_signals, IterationOutcome};
use super::state::{IterationState, LoopStatus};
use crate::config::{Procedure, ProcedureCatalog};
use crate::process::{AgentRunner, ExecutionError, ExecutionRequest, ProcessExecutor};
use crate::prompt::{FragmentAssembler, IterationContext, PromptAssembler};

// ============================================================================
// Dependencies
// ============================================================================

/// Collaborators injected into the controller.
pub struct LoopDependencies {
    /// Runs the agent for one iteration.
    pub runner: Arc<dyn AgentRunner>,
    /// Produces each iteration's prompt.
    pub assembler: Arc<dyn PromptAssembler>,
    /// Receives loop events.
    pub events: Arc<dyn EventSink>,
}

impl fmt::Debug for LoopDependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopDependencies")
            .field("runner", &"<dyn AgentRunner>")
            .field("assembler", &"<dyn PromptAssembler>")
            .field("events", &"<dyn EventSink>")
            .finish()
    }
}

impl LoopDependencies {
    /// Production wiring: real processes, fragment prompts, tracing output.
    #[must_use]
    pub fn real(catalog: Arc<dyn ProcedureCatalog>, working_dir: Option<PathBuf>) -> Self {
        let mut executor = ProcessExecutor::new();
        if let Some(dir) = working_dir {
            executor = executor.with_working_dir(dir);
        }
        Self {
            runner: Arc::new(executor),
            assembler: Arc::new(FragmentAssembler::new(catalog)),
            events: Arc::new(TracingSink::new()),
        }
    }
}

// ============================================================================
// Run plan
// ============================================================================

/// What to run: the resolved command, procedure and user context.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub command: String,
    pub procedure: Procedure,
    pub user_context: Vec<String>,
    /// Mirror agent output to stdout while it runs.
    pub echo: bool,
}

impl RunPlan {
    #[must_use]
    pub fn new(command: impl Into<String>, procedure: Procedure) -> Self {
        Self {
            command: command.into(),
            procedure,
            user_context: Vec::new(),
            echo: false,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.user_context = context;
        self
    }

    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Drives iterations of one procedure until a terminal status.
#[derive(Debug)]
pub struct LoopController {
    deps: LoopDependencies,
    plan: RunPlan,
}

/// What a single pass decided.
enum Step {
    Continue,
    Stop(LoopStatus),
}

impl LoopController {
    #[must_use]
    pub fn new(deps: LoopDependencies, plan: RunPlan) -> Self {
        Self { deps, plan }
    }

    /// Run until a terminal status and return it.
    ///
    /// The status is also stored in `state`. A state that is already
    /// terminal is returned unchanged without running anything.
    pub async fn run(&self, state: &mut IterationState, cancel: &CancellationToken) -> LoopStatus {
        if state.status().is_terminal() {
            return state.status();
        }

        self.deps.events.emit(&LoopEvent::RunStarted {
            procedure: state.procedure_name.clone(),
            max_iterations: state.max_iterations,
            timeout_secs: state.iteration_timeout,
            failure_threshold: state.failure_threshold,
        });

        let status = loop {
            match self.step(state, cancel).await {
                Step::Continue => {}
                Step::Stop(status) => break status,
            }
        };
        state.finish(status);

        self.deps.events.emit(&LoopEvent::RunFinished {
            status: state.status(),
            iterations: state.iteration,
            elapsed: state.elapsed(),
            stats: state.stats.clone(),
        });
        state.status()
    }

    async fn step(&self, state: &mut IterationState, cancel: &CancellationToken) -> Step {
        if state.reached_max_iterations() {
            return Step::Stop(LoopStatus::MaxIters);
        }
        if state.reached_failure_threshold() {
            return self.abort(
                state,
                AbortReason::FailureThreshold {
                    threshold: state.failure_threshold,
                    count: state.consecutive_failures,
                },
            );
        }

        let index = state.iteration;
        let context = IterationContext::new(index, state.max_iterations);
        let prompt = match self.deps.assembler.assemble(
            &self.plan.procedure,
            &self.plan.user_context,
            Some(context),
        ) {
            Ok(prompt) => prompt,
            Err(e) => return self.abort(state, AbortReason::PromptAssembly(e.to_string())),
        };

        self.deps.events.emit(&LoopEvent::IterationStarted {
            index,
            max_iterations: state.max_iterations,
            prompt_len: prompt.len(),
        });

        let request = ExecutionRequest::new(self.plan.command.clone(), prompt)
            .with_timeout(state.iteration_timeout)
            .with_max_output_bytes(state.max_output_buffer)
            .with_echo(self.plan.echo);
        let result = self.deps.runner.execute(&request, cancel).await;

        match &result.error {
            Some(ExecutionError::Interrupted) => {
                self.deps.events.emit(&LoopEvent::Interrupted { index });
                return Step::Stop(LoopStatus::Interrupted);
            }
            Some(ExecutionError::Timeout { secs }) => {
                state.record_failure();
                state.stats.record(result.duration);
                self.deps.events.emit(&LoopEvent::IterationTimedOut {
                    index,
                    timeout_secs: *secs,
                    elapsed: result.duration,
                    consecutive_failures: state.consecutive_failures,
                });
                state.advance();
                return Step::Continue;
            }
            Some(ExecutionError::InvalidCommand(msg)) => {
                return self.abort(state, AbortReason::InvalidCommand(msg.clone()));
            }
            Some(e @ (ExecutionError::Spawn(_) | ExecutionError::Wait(_))) => {
                return self.abort(state, AbortReason::Execution(e.to_string()));
            }
            None => {}
        }

        let signals = scan_signals(&result.output);
        let outcome = classify(result.exit_code, &result.output);
        match outcome {
            IterationOutcome::JobDone => {}
            IterationOutcome::Failure => state.record_failure(),
            IterationOutcome::Success => state.record_clean(),
        }
        state.stats.record(result.duration);

        self.deps.events.emit(&LoopEvent::IterationCompleted {
            index,
            outcome,
            exit_code: result.exit_code,
            signals,
            elapsed: result.duration,
            consecutive_failures: state.consecutive_failures,
            truncated: result.truncated,
        });
        state.advance();

        if outcome == IterationOutcome::JobDone {
            Step::Stop(LoopStatus::Success)
        } else {
            Step::Continue
        }
    }

    fn abort(&self, state: &IterationState, reason: AbortReason) -> Step {
        self.deps.events.emit(&LoopEvent::Aborted {
            index: state.iteration,
            reason,
        });
        Step::Stop(LoopStatus::Aborted)
    }
}
