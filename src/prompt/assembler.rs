//! Fragment-based prompt assembly.
//!
//! Builds the prompt handed to the agent on every iteration: a fixed preamble
//! (procedure, iteration progress, role, promise signals), an optional context
//! block, then one section per non-empty OODA phase.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rooda::config::{FragmentAction, Procedure};
//! use rooda::procedures::BuiltinCatalog;
//! use rooda::prompt::{FragmentAssembler, IterationContext, PromptAssembler};
//!
//! let assembler = FragmentAssembler::new(Arc::new(BuiltinCatalog::new()));
//! let procedure = Procedure {
//!     display: "Tidy docs".into(),
//!     act: vec![FragmentAction::inline("Fix typos in README.md.")],
//!     ..Procedure::default()
//! };
//!
//! let prompt = assembler
//!     .assemble(&procedure, &[], Some(IterationContext::new(0, Some(3))))
//!     .unwrap();
//! assert!(prompt.contains("Iteration: 1 of 3"));
//! assert!(prompt.contains("PHASE 4: ACT"));
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::{FragmentAction, Procedure, ProcedureCatalog};
use crate::error::{Result, RoodaError};
use crate::r#loop::outcome::{FAILURE_SIGNAL, SUCCESS_SIGNAL};
use crate::prompt::templates;
use crate::prompt::{IterationContext, PromptAssembler};

const RULE: &str = "═══════════════════════════════════════════════════════════════";

/// Phase headings in execution order: (number, name, description).
const PHASES: [(u8, &str, &str); 4] = [
    (
        1,
        "OBSERVE",
        "Execute these observation tasks to gather information.",
    ),
    (
        2,
        "ORIENT",
        "Analyze the information you gathered and form your understanding.",
    ),
    (3, "DECIDE", "Make decisions about what actions to take."),
    (
        4,
        "ACT",
        "Execute the actions you decided on. Modify files, run commands, commit changes.",
    ),
];

/// Default [`PromptAssembler`] backed by a procedure catalog.
///
/// `builtin:` fragment paths are resolved through the catalog; every other
/// path is read from disk as given (the config loader has already made
/// relative paths absolute).
pub struct FragmentAssembler {
    catalog: Arc<dyn ProcedureCatalog>,
}

impl fmt::Debug for FragmentAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentAssembler")
            .field("catalog", &"<dyn ProcedureCatalog>")
            .finish()
    }
}

impl FragmentAssembler {
    /// Create an assembler resolving built-in fragments through `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn ProcedureCatalog>) -> Self {
        Self { catalog }
    }

    /// Load one fragment and apply its parameters.
    ///
    /// # Errors
    ///
    /// Fails when the fragment has no source, a built-in or file path cannot
    /// be found, or a placeholder has no matching parameter.
    pub fn load_fragment(&self, fragment: &FragmentAction) -> Result<String> {
        let raw = match (&fragment.content, &fragment.path) {
            (Some(content), _) => content.clone(),
            (None, Some(path)) if fragment.is_builtin() => self
                .catalog
                .fragment(path)
                .ok_or_else(|| RoodaError::FragmentNotFound { path: path.clone() })?,
            (None, Some(path)) => read_fragment_file(path)?,
            (None, None) => {
                return Err(RoodaError::prompt(
                    "fragment must specify either content or path",
                ))
            }
        };

        if fragment.parameters.is_empty() {
            Ok(raw)
        } else {
            templates::render(&raw, &fragment.parameters)
        }
    }

    fn compose_phase(&self, name: &str, fragments: &[FragmentAction]) -> Result<String> {
        let mut parts = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let text = self.load_fragment(fragment).map_err(|e| match e {
                RoodaError::Prompt { message } => {
                    RoodaError::prompt(format!("failed to compose {} phase: {}", name, message))
                }
                other => other,
            })?;
            parts.push(text.trim().to_string());
        }
        Ok(parts.join("\n\n"))
    }
}

impl PromptAssembler for FragmentAssembler {
    fn assemble(
        &self,
        procedure: &Procedure,
        user_context: &[String],
        iteration: Option<IterationContext>,
    ) -> Result<String> {
        let mut prompt = preamble(procedure, iteration);
        prompt.push_str("\n\n");

        let values: Vec<&str> = user_context
            .iter()
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .collect();
        if !values.is_empty() {
            prompt.push_str("=== CONTEXT ===\n");
            let mut blocks = Vec::with_capacity(values.len());
            for value in values {
                blocks.push(context_block(value)?);
            }
            prompt.push_str(&blocks.join("\n\n"));
            prompt.push_str("\n\n");
        }

        let fragments = procedure.phases();
        for ((number, name, description), (_, list)) in PHASES.iter().zip(fragments.iter()) {
            let content = self.compose_phase(name, list)?;
            let trimmed = content.trim();
            if trimmed.is_empty() {
                continue;
            }
            prompt.push_str(RULE);
            prompt.push('\n');
            prompt.push_str(&format!("PHASE {}: {}\n", number, name));
            prompt.push_str(description);
            prompt.push('\n');
            prompt.push_str(RULE);
            prompt.push('\n');
            prompt.push_str(trimmed);
            prompt.push_str("\n\n");
        }

        Ok(prompt)
    }
}

fn preamble(procedure: &Procedure, iteration: Option<IterationContext>) -> String {
    let mut out = String::new();
    out.push_str(RULE);
    out.push_str("\nROODA PROCEDURE EXECUTION\n");
    out.push_str(RULE);
    out.push_str("\n\n");

    if !procedure.display.is_empty() {
        out.push_str(&format!("Procedure: {}\n\n", procedure.display));
    }

    if let Some(ctx) = iteration {
        out.push_str(&format!("Iteration: {}\n\n", ctx));
    }

    out.push_str("Your Role:\n");
    out.push_str("You are an AI coding agent executing a structured OODA loop procedure.\n");
    out.push_str("This is NOT a template or example - this is an EXECUTABLE PROCEDURE.\n");
    out.push_str("You must complete all phases and produce concrete outputs.\n\n");

    out.push_str("Success Signaling:\n");
    out.push_str(&format!(
        "- When you complete all tasks successfully, output: {}\n",
        SUCCESS_SIGNAL
    ));
    out.push_str(&format!(
        "- If you cannot proceed due to blockers, output: {}\n",
        FAILURE_SIGNAL
    ));
    out.push_str("- Explanations should come AFTER the signal, not embedded in the tag\n");
    out.push_str("- The loop orchestrator uses these signals to determine iteration outcome.\n");
    out
}

/// A context value naming an existing file is replaced by the file's text,
/// prefixed with its source. Anything else is used verbatim.
fn context_block(value: &str) -> Result<String> {
    let path = Path::new(value);
    if !path.is_file() {
        return Ok(value.to_string());
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        RoodaError::prompt(format!("failed to read context file '{}': {}", value, e))
    })?;
    Ok(format!("Source: {}\n\n{}", value, content))
}

fn read_fragment_file(path: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RoodaError::FragmentNotFound {
                path: path.to_string(),
            }
        } else {
            RoodaError::prompt(format!("failed to read fragment '{}': {}", path, e))
        }
    })
}
