//! rooda - OODA loop orchestrator for AI coding agents
//!
//! Drives an external agent command through bounded iterations of a named
//! procedure until the agent signals completion, a consecutive-failure
//! budget runs out, or the user interrupts.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`r#loop`] - Iteration controller, run state, outcome classification, statistics
//! - [`process`] - Agent process execution with timeout, cancellation and bounded capture
//! - [`signals`] - OS signal relay feeding a cancellation token
//! - [`config`] - Layered configuration, validation and AI command resolution
//! - [`procedures`] - Built-in procedure catalog
//! - [`prompt`] - Prompt assembly from procedure fragments
//! - [`observability`] - Tracing subscriber setup
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Test doubles for the loop's seams
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rooda::config::{ConfigLoader, RunOverrides};
//! use rooda::procedures::BuiltinCatalog;
//! use rooda::r#loop::{IterationState, LoopController, LoopDependencies, RunPlan};
//! use rooda::signals::SignalRelay;
//!
//! # #[tokio::main]
//! # async fn main() -> rooda::Result<()> {
//! let catalog = Arc::new(BuiltinCatalog::new());
//! let config = ConfigLoader::new(catalog.clone()).load()?;
//! let settings = config.run_settings("build", &RunOverrides::default())?;
//!
//! let relay = SignalRelay::setup()?;
//! let controller = LoopController::new(
//!     LoopDependencies::real(catalog, None),
//!     RunPlan::new(settings.ai_cmd.clone(), settings.procedure.clone()),
//! );
//! let mut state = IterationState::new("build")
//!     .with_max_iterations(settings.max_iterations)
//!     .with_timeout(settings.iteration_timeout);
//!
//! let status = controller.run(&mut state, &relay.token()).await;
//! std::process::exit(status.exit_code());
//! # }
//! ```

pub mod config;
pub mod error;
pub mod r#loop;
pub mod observability;
pub mod procedures;
pub mod process;
pub mod prompt;
pub mod signals;
pub mod testing;

// Re-export commonly used types
pub use error::{Result, RoodaError};

pub use config::{RoodaConfig, RunOverrides, RunSettings};
pub use process::{AgentRunner, ExecutionError, ExecutionRequest, ExecutionResult, ProcessExecutor};
pub use r#loop::{IterationOutcome, IterationState, LoopController, LoopStatus};
pub use signals::SignalRelay;
