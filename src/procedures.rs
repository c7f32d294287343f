//! Built-in procedure catalog.
//!
//! Procedures and their fragments ship inside the binary. The catalog is a
//! plain value handed to [`ConfigLoader`](crate::config::ConfigLoader) and to
//! the prompt assembler; user configuration can override any procedure field
//! by name.

use std::collections::BTreeMap;

use crate::config::{FragmentAction, Procedure, ProcedureCatalog};

const FRAGMENTS: &[(&str, &str)] = &[
    // ------------------------------------------------------------------ observe
    (
        "builtin:observe/read_agents.md",
        "Read AGENTS.md at the repository root. Note the build, test and lint \
         commands, where specifications and implementation live, and any \
         operational rules for this repository.",
    ),
    (
        "builtin:observe/study_specs.md",
        "Study the specification documents. List each capability they describe, \
         the acceptance criteria that accompany it, and any open questions.",
    ),
    (
        "builtin:observe/study_impl.md",
        "Study the implementation. Map modules to the capabilities they provide, \
         and run the test command from AGENTS.md to record the current state.",
    ),
    (
        "builtin:observe/study_plan.md",
        "Read PLAN.md. Identify completed tasks, tasks in progress, and tasks \
         not yet started.",
    ),
    (
        "builtin:observe/study_task_input.md",
        "Read the task description supplied in the CONTEXT section. If no task \
         description was supplied, stop and emit the FAILURE signal.",
    ),
    (
        "builtin:observe/inspect_repository.md",
        "Inspect the repository layout, build files and CI configuration to \
         learn how the project is actually built and tested.",
    ),
    // ------------------------------------------------------------------- orient
    (
        "builtin:orient/identify_drift.md",
        "Compare what AGENTS.md claims with what you observed. List every \
         command, path or rule that is missing, stale or wrong.",
    ),
    (
        "builtin:orient/select_next_task.md",
        "Pick the single most important unfinished task from PLAN.md. Prefer \
         tasks whose dependencies are complete.",
    ),
    (
        "builtin:orient/evaluate_quality.md",
        "Evaluate the {{subject}} for clarity, completeness and internal \
         consistency. Record each defect with its location.",
    ),
    (
        "builtin:orient/compare_sources.md",
        "Treat the {{reference}} as the source of truth and check the \
         {{subject}} against it. Record every capability that is missing, \
         extra, or behaves differently.",
    ),
    (
        "builtin:orient/break_down_task.md",
        "Break the requested {{kind}} into small, independently verifiable steps \
         that change the {{target}}. Each step must name the files it touches \
         and how to verify it.",
    ),
    // ------------------------------------------------------------------- decide
    (
        "builtin:decide/prioritize_findings.md",
        "Order the findings by impact. Decide which ones to address in this \
         iteration and which to leave for later.",
    ),
    (
        "builtin:decide/plan_change.md",
        "Decide exactly which files to change and which validation commands will \
         prove the change works.",
    ),
    (
        "builtin:decide/check_completion.md",
        "Decide whether any work remains. If nothing remains, you will emit the \
         SUCCESS signal after acting.",
    ),
    // ---------------------------------------------------------------------- act
    (
        "builtin:act/update_agents.md",
        "Update AGENTS.md so that every command, path and rule matches the \
         repository as it is now. Commit the change.",
    ),
    (
        "builtin:act/implement_task.md",
        "Implement the selected task. Run the build and test commands from \
         AGENTS.md, fix any failures, mark the task done in PLAN.md and commit.",
    ),
    (
        "builtin:act/write_report.md",
        "Write the findings to {{report}}, one section per finding with its \
         location, impact and suggested fix.",
    ),
    (
        "builtin:act/write_plan.md",
        "Write the steps to PLAN.md as an ordered task list, replacing any \
         previous draft.",
    ),
    (
        "builtin:act/publish_plan.md",
        "Convert each unfinished task in PLAN.md into an entry in the issue \
         tracker named in AGENTS.md, then record the issue references in \
         PLAN.md.",
    ),
    (
        "builtin:act/emit_signal.md",
        "When all work for this procedure is complete, output \
         <promise>SUCCESS</promise>. If you are blocked, output \
         <promise>FAILURE</promise> followed by the reason.",
    ),
];

fn frag(name: &str) -> FragmentAction {
    FragmentAction::from_path(format!("builtin:{}.md", name))
}

struct Entry {
    name: &'static str,
    display: &'static str,
    summary: &'static str,
    description: &'static str,
    observe: Vec<FragmentAction>,
    orient: Vec<FragmentAction>,
    decide: Vec<FragmentAction>,
    act: Vec<FragmentAction>,
}

fn audit(name: &'static str, display: &'static str, subject: &str, report: &str) -> Entry {
    Entry {
        name,
        display,
        summary: "Audit and write a findings report",
        description: "Reads the repository and writes a report of quality defects without changing the audited files.",
        observe: vec![frag("observe/read_agents"), frag("observe/study_specs"), frag("observe/study_impl")],
        orient: vec![frag("orient/evaluate_quality").with_parameter("subject", subject)],
        decide: vec![frag("decide/prioritize_findings")],
        act: vec![
            frag("act/write_report").with_parameter("report", report),
            frag("act/emit_signal"),
        ],
    }
}

fn gap(name: &'static str, display: &'static str, reference: &str, subject: &str) -> Entry {
    Entry {
        name,
        display,
        summary: "Find gaps between specification and implementation",
        description: "Compares one side of the repository against the other and reports what is missing or divergent.",
        observe: vec![frag("observe/read_agents"), frag("observe/study_specs"), frag("observe/study_impl")],
        orient: vec![frag("orient/compare_sources")
            .with_parameter("reference", reference)
            .with_parameter("subject", subject)],
        decide: vec![frag("decide/prioritize_findings")],
        act: vec![
            frag("act/write_report").with_parameter("report", "GAP_REPORT.md"),
            frag("act/emit_signal"),
        ],
    }
}

fn draft(name: &'static str, display: &'static str, target: &str, kind: &str) -> Entry {
    Entry {
        name,
        display,
        summary: "Draft a step-by-step plan for a requested change",
        description: "Turns the task description given with --context into an ordered plan in PLAN.md.",
        observe: vec![
            frag("observe/read_agents"),
            frag("observe/study_task_input"),
            if target == "specification" {
                frag("observe/study_specs")
            } else {
                frag("observe/study_impl")
            },
        ],
        orient: vec![frag("orient/break_down_task")
            .with_parameter("kind", kind)
            .with_parameter("target", target)],
        decide: vec![frag("decide/plan_change")],
        act: vec![frag("act/write_plan"), frag("act/emit_signal")],
    }
}

fn entries() -> Vec<Entry> {
    vec![
        Entry {
            name: "agents-sync",
            display: "Sync AGENTS.md",
            summary: "Bring AGENTS.md in line with the repository",
            description: "Detects drift between AGENTS.md and the actual build, test and layout of the repository, then fixes it.",
            observe: vec![frag("observe/read_agents"), frag("observe/inspect_repository")],
            orient: vec![frag("orient/identify_drift")],
            decide: vec![frag("decide/check_completion")],
            act: vec![frag("act/update_agents"), frag("act/emit_signal")],
        },
        Entry {
            name: "build",
            display: "Build from plan",
            summary: "Implement the next task from PLAN.md",
            description: "Each iteration implements one task from PLAN.md, validates it and commits. Signals success when the plan is complete.",
            observe: vec![frag("observe/read_agents"), frag("observe/study_plan"), frag("observe/study_impl")],
            orient: vec![frag("orient/select_next_task")],
            decide: vec![frag("decide/plan_change"), frag("decide/check_completion")],
            act: vec![frag("act/implement_task"), frag("act/emit_signal")],
        },
        Entry {
            name: "publish-plan",
            display: "Publish plan",
            summary: "Publish PLAN.md tasks to the issue tracker",
            description: "Creates one tracker entry per unfinished task in PLAN.md and records the references.",
            observe: vec![frag("observe/read_agents"), frag("observe/study_plan")],
            orient: vec![frag("orient/select_next_task")],
            decide: vec![frag("decide/check_completion")],
            act: vec![frag("act/publish_plan"), frag("act/emit_signal")],
        },
        audit("audit-spec", "Audit specification", "specification", "SPEC_AUDIT.md"),
        audit("audit-impl", "Audit implementation", "implementation", "IMPL_AUDIT.md"),
        audit("audit-agents", "Audit AGENTS.md", "AGENTS.md file", "AGENTS_AUDIT.md"),
        gap("audit-spec-to-impl", "Spec to implementation gaps", "specification", "implementation"),
        gap("audit-impl-to-spec", "Implementation to spec gaps", "implementation", "specification"),
        draft("draft-plan-spec-feat", "Draft plan (spec-feat)", "specification", "feature"),
        draft("draft-plan-spec-fix", "Draft plan (spec-fix)", "specification", "bug fix"),
        draft("draft-plan-spec-refactor", "Draft plan (spec-refactor)", "specification", "refactor"),
        draft("draft-plan-spec-chore", "Draft plan (spec-chore)", "specification", "maintenance chore"),
        draft("draft-plan-impl-feat", "Draft plan (impl-feat)", "implementation", "feature"),
        draft("draft-plan-impl-fix", "Draft plan (impl-fix)", "implementation", "bug fix"),
        draft("draft-plan-impl-refactor", "Draft plan (impl-refactor)", "implementation", "refactor"),
        draft("draft-plan-impl-chore", "Draft plan (impl-chore)", "implementation", "maintenance chore"),
    ]
}

/// Procedures and fragments compiled into rooda.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

impl BuiltinCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Names of every built-in fragment.
    pub fn fragment_paths(&self) -> impl Iterator<Item = &'static str> {
        FRAGMENTS.iter().map(|(path, _)| *path)
    }
}

impl ProcedureCatalog for BuiltinCatalog {
    fn procedures(&self) -> BTreeMap<String, Procedure> {
        entries()
            .into_iter()
            .map(|entry| {
                (
                    entry.name.to_string(),
                    Procedure {
                        display: entry.display.to_string(),
                        summary: entry.summary.to_string(),
                        description: entry.description.to_string(),
                        observe: entry.observe,
                        orient: entry.orient,
                        decide: entry.decide,
                        act: entry.act,
                        ..Procedure::default()
                    },
                )
            })
            .collect()
    }

    fn fragment(&self, path: &str) -> Option<String> {
        FRAGMENTS
            .iter()
            .find(|(name, _)| *name == path)
            .map(|(_, text)| (*text).to_string())
    }
}
