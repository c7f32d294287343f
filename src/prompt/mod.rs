//! Prompt assembly.
//!
//! The loop asks a [`PromptAssembler`] for fresh prompt text at the start of
//! every iteration, passing the iteration index so progress can be announced
//! to the agent.
//!
//! - [`assembler`] - [`FragmentAssembler`], the default implementation
//! - [`templates`] - `{{name}}` parameter substitution for fragments

pub mod assembler;
pub mod templates;

use std::fmt;

use crate::config::Procedure;
use crate::error::Result;

pub use assembler::FragmentAssembler;

/// Iteration progress passed to the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationContext {
    /// Zero-based index of the iteration about to run.
    pub current_index: u32,
    /// Upper bound, `None` when unlimited.
    pub max_iterations: Option<u32>,
}

impl IterationContext {
    /// Create a context for iteration `current_index`.
    #[must_use]
    pub fn new(current_index: u32, max_iterations: Option<u32>) -> Self {
        Self {
            current_index,
            max_iterations,
        }
    }
}

/// Renders one-based progress: `3 of 5` or `3 (unlimited)`.
impl fmt::Display for IterationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = u64::from(self.current_index) + 1;
        match self.max_iterations {
            Some(max) => write!(f, "{} of {}", current, max),
            None => write!(f, "{} (unlimited)", current),
        }
    }
}

/// Produces the prompt text for one iteration.
pub trait PromptAssembler: Send + Sync {
    /// Assemble the prompt for `procedure`.
    ///
    /// `user_context` values are either file paths or inline text.
    ///
    /// # Errors
    ///
    /// Returns an error when a fragment or context file cannot be loaded or
    /// a template parameter is missing. The loop treats this as fatal.
    fn assemble(
        &self,
        procedure: &Procedure,
        user_context: &[String],
        iteration: Option<IterationContext>,
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_context_display() {
        assert_eq!(IterationContext::new(0, Some(5)).to_string(), "1 of 5");
        assert_eq!(IterationContext::new(4, None).to_string(), "5 (unlimited)");
        assert_eq!(
            IterationContext::new(u32::MAX, None).to_string(),
            "4294967296 (unlimited)"
        );
    }
}
