//! Test doubles for rooda's seams.
//!
//! The loop controller talks to the outside world through three traits:
//! [`AgentRunner`](crate::process::AgentRunner),
//! [`PromptAssembler`](crate::prompt::PromptAssembler) and
//! [`EventSink`](crate::r#loop::events::EventSink). The doubles here let unit
//! and integration tests drive whole runs without spawning processes.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use rooda::config::Procedure;
//! use rooda::r#loop::{IterationState, LoopController, LoopDependencies, LoopStatus, RunPlan};
//! use rooda::testing::{RecordingSink, ScriptedAgent, StaticPromptAssembler};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let deps = LoopDependencies {
//!     runner: Arc::new(ScriptedAgent::new().then_success_signal()),
//!     assembler: Arc::new(StaticPromptAssembler::new()),
//!     events: Arc::new(RecordingSink::new()),
//! };
//! let controller = LoopController::new(deps, RunPlan::new("agent", Procedure::default()));
//! let mut state = IterationState::new("demo");
//!
//! let status = controller.run(&mut state, &CancellationToken::new()).await;
//! assert_eq!(status, LoopStatus::Success);
//! # }
//! ```

pub mod mocks;

pub use mocks::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Procedure;
    use crate::r#loop::events::EventSink;
    use crate::r#loop::events::LoopEvent;
    use crate::process::{AgentRunner, ExecutionError, ExecutionRequest};
    use crate::prompt::{IterationContext, PromptAssembler};
    use tokio_util::sync::CancellationToken;

    // =========================================================================
    // ScriptedAgent
    // =========================================================================

    #[tokio::test]
    async fn test_scripted_agent_replays_then_falls_back() {
        let agent = ScriptedAgent::new()
            .then_exit(2, "boom")
            .then_timeout(7)
            .always_exit(5);
        let request = ExecutionRequest::new("agent", "prompt");
        let cancel = CancellationToken::new();

        let first = agent.execute(&request, &cancel).await;
        assert_eq!(first.exit_code, 2);
        assert_eq!(first.output, b"boom");

        let second = agent.execute(&request, &cancel).await;
        assert_eq!(second.error, Some(ExecutionError::Timeout { secs: 7 }));

        let third = agent.execute(&request, &cancel).await;
        assert_eq!(third.exit_code, 5);
        assert_eq!(agent.call_count(), 3);
        assert_eq!(agent.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_agent_cancel_on_call() {
        let agent = ScriptedAgent::new().with_cancel_on_call(2);
        let request = ExecutionRequest::new("agent", "prompt");
        let cancel = CancellationToken::new();

        assert!(agent.execute(&request, &cancel).await.error.is_none());
        let second = agent.execute(&request, &cancel).await;
        assert_eq!(second.error, Some(ExecutionError::Interrupted));
        assert!(cancel.is_cancelled());
    }

    // =========================================================================
    // StaticPromptAssembler
    // =========================================================================

    #[test]
    fn test_static_assembler_records_contexts_and_fails_on_demand() {
        let assembler = StaticPromptAssembler::new()
            .with_text("hello")
            .with_failure_on_call(2);
        let procedure = Procedure::default();
        let ctx = Some(IterationContext::new(0, Some(2)));

        assert_eq!(assembler.assemble(&procedure, &[], ctx).unwrap(), "hello");
        assert!(assembler.assemble(&procedure, &[], None).is_err());
        assert_eq!(assembler.contexts(), vec![ctx, None]);
    }

    // =========================================================================
    // RecordingSink
    // =========================================================================

    #[test]
    fn test_recording_sink_clones_share_events() {
        let sink = RecordingSink::new();
        let clone = sink.clone();
        clone.emit(&LoopEvent::Interrupted { index: 0 });

        assert_eq!(sink.events().len(), 1);
        assert_eq!(
            sink.count(|e| matches!(e, LoopEvent::Interrupted { .. })),
            1
        );
    }

    #[test]
    fn test_static_catalog() {
        use crate::config::ProcedureCatalog;

        let catalog = StaticCatalog::new()
            .with_procedure("one", Procedure::default())
            .with_fragment("builtin:x.md", "text");
        assert!(catalog.procedures().contains_key("one"));
        assert_eq!(catalog.fragment("builtin:x.md").as_deref(), Some("text"));
        assert!(catalog.fragment("builtin:y.md").is_none());
    }
}
