//! Test doubles for the loop's injected seams.
//!
//! Each double is configured with builder methods and records how it was
//! called, so tests can assert on both the loop's result and its traffic.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{Procedure, ProcedureCatalog};
use crate::error::{Result, RoodaError};
use crate::r#loop::events::{EventSink, LoopEvent};
use crate::r#loop::outcome::SUCCESS_SIGNAL;
use crate::process::{AgentRunner, ExecutionError, ExecutionRequest, ExecutionResult};
use crate::prompt::{IterationContext, PromptAssembler};

// ============================================================================
// ScriptedAgent
// ============================================================================

/// Agent runner that replays scripted results.
///
/// Results are handed out in order; once the script runs out the fallback
/// result is returned forever.
///
/// # Example
///
/// ```
/// use rooda::testing::ScriptedAgent;
///
/// let agent = ScriptedAgent::new()
///     .then_exit(1, "compile error")
///     .then_success_signal();
/// assert_eq!(agent.call_count(), 0);
/// ```
#[derive(Debug)]
pub struct ScriptedAgent {
    script: Mutex<VecDeque<ExecutionResult>>,
    fallback: ExecutionResult,
    cancel_on_call: Option<u32>,
    requests: Mutex<Vec<ExecutionRequest>>,
    call_count: AtomicU32,
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: ExecutionResult::exited(0, Vec::<u8>::new(), Duration::from_millis(10)),
            cancel_on_call: None,
            requests: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }
}

impl ScriptedAgent {
    /// Create an agent that always exits cleanly with no output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Result returned once the script is exhausted.
    #[must_use]
    pub fn with_fallback(mut self, result: ExecutionResult) -> Self {
        self.fallback = result;
        self
    }

    /// Every unscripted call exits with `code` and no output.
    #[must_use]
    pub fn always_exit(self, code: i32) -> Self {
        self.with_fallback(ExecutionResult::exited(
            code,
            Vec::<u8>::new(),
            Duration::from_millis(10),
        ))
    }

    /// Queue an arbitrary result.
    #[must_use]
    pub fn then(self, result: ExecutionResult) -> Self {
        self.lock_script().push_back(result);
        self
    }

    /// Queue a natural exit.
    #[must_use]
    pub fn then_exit(self, code: i32, output: &str) -> Self {
        self.then(ExecutionResult::exited(
            code,
            output.as_bytes().to_vec(),
            Duration::from_millis(10),
        ))
    }

    /// Queue a clean exit that emits the success promise.
    #[must_use]
    pub fn then_success_signal(self) -> Self {
        self.then_exit(0, &format!("all done\n{}\n", SUCCESS_SIGNAL))
    }

    /// Queue a timeout after `secs` seconds.
    #[must_use]
    pub fn then_timeout(self, secs: u64) -> Self {
        self.then(ExecutionResult::failed(
            ExecutionError::Timeout { secs },
            Duration::from_secs(secs),
        ))
    }

    /// Queue an execution error.
    #[must_use]
    pub fn then_error(self, error: ExecutionError) -> Self {
        self.then(ExecutionResult::failed(error, Duration::ZERO))
    }

    /// Cancel the token when call number `call` (1-based) arrives, then
    /// report the interruption.
    #[must_use]
    pub fn with_cancel_on_call(mut self, call: u32) -> Self {
        self.cancel_on_call = Some(call);
        self
    }

    /// Number of executions so far.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<ExecutionResult>> {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl AgentRunner for ScriptedAgent {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if self.cancel_on_call == Some(call) {
            cancel.cancel();
        }
        if cancel.is_cancelled() {
            return ExecutionResult::failed(ExecutionError::Interrupted, Duration::from_millis(1));
        }

        self.lock_script()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

// ============================================================================
// StaticPromptAssembler
// ============================================================================

/// Prompt assembler returning fixed text, or failing on a chosen call.
#[derive(Debug)]
pub struct StaticPromptAssembler {
    text: String,
    fail_on_call: Option<u32>,
    contexts: Mutex<Vec<Option<IterationContext>>>,
    call_count: AtomicU32,
}

impl Default for StaticPromptAssembler {
    fn default() -> Self {
        Self {
            text: "do the work".to_string(),
            fail_on_call: None,
            contexts: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }
}

impl StaticPromptAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Fail with a prompt error on call number `call` (1-based).
    #[must_use]
    pub fn with_failure_on_call(mut self, call: u32) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Iteration contexts received, in order.
    pub fn contexts(&self) -> Vec<Option<IterationContext>> {
        self.contexts
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl PromptAssembler for StaticPromptAssembler {
    fn assemble(
        &self,
        _procedure: &Procedure,
        _user_context: &[String],
        iteration: Option<IterationContext>,
    ) -> Result<String> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.push(iteration);
        }
        if self.fail_on_call == Some(call) {
            return Err(RoodaError::FragmentNotFound {
                path: "builtin:missing.md".to_string(),
            });
        }
        Ok(self.text.clone())
    }
}

// ============================================================================
// RecordingSink
// ============================================================================

/// Event sink that keeps every event for later inspection.
///
/// Cloning shares the underlying record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<LoopEvent>>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far.
    pub fn events(&self) -> Vec<LoopEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of received events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&LoopEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &LoopEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// StaticCatalog
// ============================================================================

/// In-memory procedure catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    procedures: BTreeMap<String, Procedure>,
    fragments: BTreeMap<String, String>,
}

impl StaticCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_procedure(mut self, name: &str, procedure: Procedure) -> Self {
        self.procedures.insert(name.to_string(), procedure);
        self
    }

    /// Register fragment text under a full `builtin:` path.
    #[must_use]
    pub fn with_fragment(mut self, path: &str, text: &str) -> Self {
        self.fragments.insert(path.to_string(), text.to_string());
        self
    }
}

impl ProcedureCatalog for StaticCatalog {
    fn procedures(&self) -> BTreeMap<String, Procedure> {
        self.procedures.clone()
    }

    fn fragment(&self, path: &str) -> Option<String> {
        self.fragments.get(path).cloned()
    }
}
