//! Iteration loop.
//!
//! - [`controller`] - [`LoopController`], the state machine driving a run
//! - [`state`] - [`IterationState`] and the terminal [`LoopStatus`]
//! - [`outcome`] - promise-signal scanning and per-iteration classification
//! - [`stats`] - constant-memory timing statistics
//! - [`events`] - semantic events and the sinks that receive them
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  assemble   ┌─────────────────┐
//! │ LoopController │────────────>│ PromptAssembler │
//! │                │             └─────────────────┘
//! │                │  execute    ┌─────────────────┐
//! │                │────────────>│ AgentRunner     │
//! │                │             └─────────────────┘
//! │                │  emit       ┌─────────────────┐
//! │                │────────────>│ EventSink       │
//! └───────┬────────┘             └─────────────────┘
//!         │ classify / record
//!         v
//! ┌────────────────┐
//! │ IterationState │
//! │  + stats       │
//! └────────────────┘
//! ```

pub mod controller;
pub mod events;
pub mod outcome;
pub mod state;
pub mod stats;

pub use controller::{LoopController, LoopDependencies, RunPlan};
pub use events::{AbortReason, EventSink, LoopEvent, TracingSink};
pub use outcome::{classify, scan_signals, IterationOutcome, PromiseSignals};
pub use state::{IterationState, LoopStatus};
pub use stats::IterationStats;
