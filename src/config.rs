//! Configuration types and run settings resolution for rooda.
//!
//! A [`RoodaConfig`] is the merged result of every configuration tier (see
//! [`resolution`]). It holds loop-wide settings, AI command aliases and the
//! procedure table. [`RoodaConfig::run_settings`] turns it, together with the
//! command-line overrides for one invocation, into the [`RunSettings`] the
//! loop controller consumes.
//!
//! # File format
//!
//! ```toml
//! [loop]
//! iteration_mode = "max-iterations"
//! default_max_iterations = 5
//! iteration_timeout = 900
//! failure_threshold = 3
//! ai_cmd_alias = "claude"
//!
//! [ai_cmd_aliases]
//! local = "my-agent --yes"
//!
//! [procedures.docs]
//! display = "Update docs"
//! summary = "Refresh README from the code"
//! observe = [{ path = "fragments/read-code.md" }]
//! act = [{ content = "Rewrite README.md." }]
//! ```

pub mod resolution;
pub mod validation;

pub use resolution::{global_config_dir, ConfigLoader, ConfigSource, ConfigTier, LoadChain};
pub use validation::validate;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoodaError};

/// File name looked up in the global and workspace directories.
pub const CONFIG_FILE_NAME: &str = "rooda-config.toml";

/// Prefix marking a fragment path served by the procedure catalog.
pub const BUILTIN_PREFIX: &str = "builtin:";

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub const DEFAULT_MAX_OUTPUT_BUFFER: usize = 10 * 1024 * 1024;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

// ============================================================================
// Enumerated settings
// ============================================================================

/// Whether iterations are bounded by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IterationMode {
    #[default]
    MaxIterations,
    Unlimited,
}

/// Minimum level of log events to emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// How log line timestamps are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimestampFormat {
    /// `[HH:MM:SS.mmm]` local time.
    #[default]
    Time,
    /// Same layout as `Time`.
    TimeMs,
    /// `[+1.234s]` since start.
    Relative,
    /// RFC 3339.
    Iso,
    None,
}

macro_rules! string_enum {
    ($ty:ident, $field:literal, { $($name:literal => $variant:ident),+ $(,)? }) => {
        impl $ty {
            /// Accepted spellings, in documentation order.
            pub const NAMES: &'static [&'static str] = &[$($name),+];

            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = RoodaError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(RoodaError::invalid(
                        $field,
                        format!("'{}' is not one of: {}", other, Self::NAMES.join(", ")),
                    )),
                }
            }
        }
    };
}

string_enum!(IterationMode, "iteration_mode", {
    "max-iterations" => MaxIterations,
    "unlimited" => Unlimited,
});

string_enum!(LogLevel, "log_level", {
    "debug" => Debug,
    "info" => Info,
    "warn" => Warn,
    "error" => Error,
});

string_enum!(TimestampFormat, "log_timestamp_format", {
    "time" => Time,
    "time-ms" => TimeMs,
    "relative" => Relative,
    "iso" => Iso,
    "none" => None,
});

// ============================================================================
// Loop settings
// ============================================================================

/// Loop-wide settings after all tiers are merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSettings {
    pub iteration_mode: IterationMode,
    pub default_max_iterations: Option<u32>,
    /// Seconds; `None` disables the timeout.
    pub iteration_timeout: Option<u64>,
    pub max_output_buffer: usize,
    pub failure_threshold: u32,
    pub log_level: LogLevel,
    pub log_timestamp_format: TimestampFormat,
    pub show_ai_output: bool,
    pub ai_cmd: Option<String>,
    pub ai_cmd_alias: Option<String>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            iteration_mode: IterationMode::MaxIterations,
            default_max_iterations: Some(DEFAULT_MAX_ITERATIONS),
            iteration_timeout: None,
            max_output_buffer: DEFAULT_MAX_OUTPUT_BUFFER,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            log_level: LogLevel::Info,
            log_timestamp_format: TimestampFormat::Time,
            show_ai_output: false,
            ai_cmd: None,
            ai_cmd_alias: None,
        }
    }
}

// ============================================================================
// Procedures
// ============================================================================

/// One prompt fragment: inline text or a path, optionally templated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, toml::Value>,
}

impl FragmentAction {
    /// An inline fragment.
    #[must_use]
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A fragment loaded from `path`.
    #[must_use]
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Attach a template parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Whether the path is served by the procedure catalog.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.path
            .as_deref()
            .is_some_and(|p| p.starts_with(BUILTIN_PREFIX))
    }
}

/// A named OODA procedure.
///
/// Also the on-disk schema: empty strings and lists mean "not set" when a
/// file tier is merged over a lower one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Procedure {
    pub display: String,
    pub summary: String,
    pub description: String,
    pub observe: Vec<FragmentAction>,
    pub orient: Vec<FragmentAction>,
    pub decide: Vec<FragmentAction>,
    pub act: Vec<FragmentAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_mode: Option<IterationMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_max_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_buffer: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_cmd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_cmd_alias: Option<String>,
}

impl Procedure {
    /// Overlay the set fields of `other` onto `self`.
    pub fn merge(&mut self, other: Procedure) {
        fn text(base: &mut String, over: String) {
            if !over.is_empty() {
                *base = over;
            }
        }
        fn list(base: &mut Vec<FragmentAction>, over: Vec<FragmentAction>) {
            if !over.is_empty() {
                *base = over;
            }
        }

        text(&mut self.display, other.display);
        text(&mut self.summary, other.summary);
        text(&mut self.description, other.description);
        list(&mut self.observe, other.observe);
        list(&mut self.orient, other.orient);
        list(&mut self.decide, other.decide);
        list(&mut self.act, other.act);
        self.iteration_mode = other.iteration_mode.or(self.iteration_mode);
        self.default_max_iterations = other.default_max_iterations.or(self.default_max_iterations);
        self.iteration_timeout = other.iteration_timeout.or(self.iteration_timeout);
        self.max_output_buffer = other.max_output_buffer.or(self.max_output_buffer);
        self.ai_cmd = other.ai_cmd.or(self.ai_cmd.take());
        self.ai_cmd_alias = other.ai_cmd_alias.or(self.ai_cmd_alias.take());
    }

    /// The four phases in execution order, paired with their names.
    #[must_use]
    pub fn phases(&self) -> [(&'static str, &[FragmentAction]); 4] {
        [
            ("observe", self.observe.as_slice()),
            ("orient", self.orient.as_slice()),
            ("decide", self.decide.as_slice()),
            ("act", self.act.as_slice()),
        ]
    }

    /// Whether the procedure sets any loop override.
    #[must_use]
    pub fn has_overrides(&self) -> bool {
        self.iteration_mode.is_some()
            || self.default_max_iterations.is_some()
            || self.iteration_timeout.is_some()
            || self.max_output_buffer.is_some()
            || self.ai_cmd.is_some()
            || self.ai_cmd_alias.is_some()
    }
}

/// Source of built-in procedures and the fragments they reference.
///
/// Handed to [`ConfigLoader`] and to the prompt assembler at construction
/// time; nothing is registered globally.
pub trait ProcedureCatalog: Send + Sync {
    /// All built-in procedures by name.
    fn procedures(&self) -> BTreeMap<String, Procedure>;

    /// Text of a `builtin:` fragment, looked up by its full path.
    fn fragment(&self, path: &str) -> Option<String>;
}

// ============================================================================
// Merged configuration
// ============================================================================

/// Built-in AI command aliases.
#[must_use]
pub fn builtin_aliases() -> BTreeMap<String, String> {
    [
        ("claude", "claude -p --dangerously-skip-permissions"),
        ("copilot", "copilot --yolo"),
        ("cursor-agent", "cursor-wrapper.sh"),
        ("kiro-cli", "kiro-cli chat --no-interactive --trust-all-tools"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Fully merged configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoodaConfig {
    #[serde(rename = "loop")]
    pub loop_settings: LoopSettings,
    pub ai_cmd_aliases: BTreeMap<String, String>,
    pub procedures: BTreeMap<String, Procedure>,
}

/// Per-invocation overrides taken from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    pub max_iterations: Option<u32>,
    pub unlimited: bool,
    pub ai_cmd: Option<String>,
    pub ai_cmd_alias: Option<String>,
}

/// Effective settings for one run of one procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub procedure_name: String,
    pub procedure: Procedure,
    pub ai_cmd: String,
    pub max_iterations: Option<u32>,
    pub iteration_timeout: Option<u64>,
    pub max_output_buffer: usize,
    pub failure_threshold: u32,
    pub show_ai_output: bool,
}

impl RoodaConfig {
    /// Built-in tier: default loop settings, built-in aliases and the
    /// catalog's procedures.
    #[must_use]
    pub fn builtin(catalog: &dyn ProcedureCatalog) -> Self {
        Self {
            loop_settings: LoopSettings::default(),
            ai_cmd_aliases: builtin_aliases(),
            procedures: catalog.procedures(),
        }
    }

    /// Look up a procedure by name.
    ///
    /// # Errors
    ///
    /// Returns [`RoodaError::UnknownProcedure`] if it is not defined.
    pub fn procedure(&self, name: &str) -> Result<&Procedure> {
        self.procedures
            .get(name)
            .ok_or_else(|| RoodaError::UnknownProcedure {
                name: name.to_string(),
            })
    }

    /// Resolve the AI command for `procedure`, first match wins:
    /// `--ai-cmd`, `--ai-cmd-alias`, procedure `ai_cmd`, procedure
    /// `ai_cmd_alias`, loop `ai_cmd`, loop `ai_cmd_alias`.
    ///
    /// # Errors
    ///
    /// Returns [`RoodaError::MissingAiCommand`] for an unknown alias or when
    /// nothing is configured.
    pub fn resolve_ai_command(&self, procedure: &Procedure, overrides: &RunOverrides) -> Result<String> {
        enum Choice<'a> {
            Command(&'a str),
            Alias(&'a str, &'static str),
        }

        let choice = [
            overrides.ai_cmd.as_deref().map(Choice::Command),
            overrides
                .ai_cmd_alias
                .as_deref()
                .map(|a| Choice::Alias(a, "--ai-cmd-alias")),
            procedure.ai_cmd.as_deref().map(Choice::Command),
            procedure
                .ai_cmd_alias
                .as_deref()
                .map(|a| Choice::Alias(a, "procedure ai_cmd_alias")),
            self.loop_settings.ai_cmd.as_deref().map(Choice::Command),
            self.loop_settings
                .ai_cmd_alias
                .as_deref()
                .map(|a| Choice::Alias(a, "loop.ai_cmd_alias")),
        ]
        .into_iter()
        .flatten()
        .next();

        match choice {
            Some(Choice::Command(cmd)) => Ok(cmd.to_string()),
            Some(Choice::Alias(alias, origin)) => self
                .ai_cmd_aliases
                .get(alias)
                .cloned()
                .ok_or_else(|| RoodaError::MissingAiCommand {
                    detail: format!(
                        "unknown alias '{}' from {}; available aliases: {}",
                        alias,
                        origin,
                        self.alias_names()
                    ),
                }),
            None => Err(RoodaError::MissingAiCommand {
                detail: format!(
                    "set --ai-cmd, --ai-cmd-alias, or loop.ai_cmd_alias in {}; available aliases: {}",
                    CONFIG_FILE_NAME,
                    self.alias_names()
                ),
            }),
        }
    }

    /// Resolve the iteration bound, first match wins: `--unlimited`,
    /// `--max-iterations`, procedure mode `unlimited`, procedure default,
    /// loop mode `unlimited`, loop default.
    #[must_use]
    pub fn resolve_max_iterations(&self, procedure: &Procedure, overrides: &RunOverrides) -> Option<u32> {
        if overrides.unlimited {
            return None;
        }
        if let Some(n) = overrides.max_iterations {
            return Some(n);
        }
        if procedure.iteration_mode == Some(IterationMode::Unlimited) {
            return None;
        }
        if let Some(n) = procedure.default_max_iterations {
            return Some(n);
        }
        if self.loop_settings.iteration_mode == IterationMode::Unlimited {
            return None;
        }
        Some(
            self.loop_settings
                .default_max_iterations
                .unwrap_or(DEFAULT_MAX_ITERATIONS),
        )
    }

    /// Build the effective settings for running `name`.
    ///
    /// # Errors
    ///
    /// Fails if the procedure is unknown or no AI command resolves.
    pub fn run_settings(&self, name: &str, overrides: &RunOverrides) -> Result<RunSettings> {
        let procedure = self.procedure(name)?;
        let ai_cmd = self.resolve_ai_command(procedure, overrides)?;

        Ok(RunSettings {
            procedure_name: name.to_string(),
            procedure: procedure.clone(),
            ai_cmd,
            max_iterations: self.resolve_max_iterations(procedure, overrides),
            iteration_timeout: procedure
                .iteration_timeout
                .or(self.loop_settings.iteration_timeout),
            max_output_buffer: procedure
                .max_output_buffer
                .unwrap_or(self.loop_settings.max_output_buffer),
            failure_threshold: self.loop_settings.failure_threshold,
            show_ai_output: self.loop_settings.show_ai_output,
        })
    }

    fn alias_names(&self) -> String {
        if self.ai_cmd_aliases.is_empty() {
            return "(none)".to_string();
        }
        self.ai_cmd_aliases
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(procedure: Procedure) -> RoodaConfig {
        let mut config = RoodaConfig {
            loop_settings: LoopSettings::default(),
            ai_cmd_aliases: builtin_aliases(),
            procedures: BTreeMap::new(),
        };
        config.procedures.insert("build".to_string(), procedure);
        config
    }

    #[test]
    fn test_string_enums_round_trip_names() {
        for name in LogLevel::NAMES {
            assert_eq!(name.parse::<LogLevel>().unwrap().as_str(), *name);
        }
        for name in TimestampFormat::NAMES {
            assert_eq!(name.parse::<TimestampFormat>().unwrap().to_string(), *name);
        }
        assert_eq!(
            "unlimited".parse::<IterationMode>().unwrap(),
            IterationMode::Unlimited
        );
    }

    #[test]
    fn test_string_enum_error_names_choices() {
        let err = "verbose".parse::<LogLevel>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("log_level"));
        assert!(msg.contains("debug, info, warn, error"));
    }

    #[test]
    fn test_loop_defaults() {
        let settings = LoopSettings::default();
        assert_eq!(settings.default_max_iterations, Some(5));
        assert_eq!(settings.max_output_buffer, 10_485_760);
        assert_eq!(settings.failure_threshold, 3);
        assert_eq!(settings.iteration_timeout, None);
        assert!(!settings.show_ai_output);
    }

    #[test]
    fn test_procedure_merge_only_overrides_set_fields() {
        let mut base = Procedure {
            display: "Build".into(),
            summary: "Implement the plan".into(),
            observe: vec![FragmentAction::from_path("builtin:observe/plan.md")],
            act: vec![FragmentAction::inline("commit")],
            default_max_iterations: Some(10),
            ..Procedure::default()
        };
        base.merge(Procedure {
            summary: "Custom summary".into(),
            act: vec![FragmentAction::inline("push")],
            iteration_timeout: Some(60),
            ..Procedure::default()
        });

        assert_eq!(base.display, "Build");
        assert_eq!(base.summary, "Custom summary");
        assert_eq!(base.observe.len(), 1);
        assert_eq!(base.act[0].content.as_deref(), Some("push"));
        assert_eq!(base.default_max_iterations, Some(10));
        assert_eq!(base.iteration_timeout, Some(60));
    }

    #[test]
    fn test_ai_command_precedence() {
        let mut procedure = Procedure {
            ai_cmd_alias: Some("copilot".into()),
            ..Procedure::default()
        };
        let mut config = config_with(procedure.clone());
        config.loop_settings.ai_cmd = Some("loop-agent".into());

        let mut overrides = RunOverrides {
            ai_cmd: Some("direct --flag".into()),
            ai_cmd_alias: Some("claude".into()),
            ..RunOverrides::default()
        };
        assert_eq!(
            config.resolve_ai_command(&procedure, &overrides).unwrap(),
            "direct --flag"
        );

        overrides.ai_cmd = None;
        assert_eq!(
            config.resolve_ai_command(&procedure, &overrides).unwrap(),
            "claude -p --dangerously-skip-permissions"
        );

        overrides.ai_cmd_alias = None;
        assert_eq!(
            config.resolve_ai_command(&procedure, &overrides).unwrap(),
            "copilot --yolo"
        );

        procedure.ai_cmd = Some("proc-agent".into());
        assert_eq!(
            config.resolve_ai_command(&procedure, &overrides).unwrap(),
            "proc-agent"
        );

        let bare = Procedure::default();
        assert_eq!(
            config.resolve_ai_command(&bare, &overrides).unwrap(),
            "loop-agent"
        );
    }

    #[test]
    fn test_unknown_alias_lists_available() {
        let config = config_with(Procedure::default());
        let overrides = RunOverrides {
            ai_cmd_alias: Some("nope".into()),
            ..RunOverrides::default()
        };
        let err = config
            .resolve_ai_command(&Procedure::default(), &overrides)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'nope'"));
        assert!(msg.contains("claude, copilot, cursor-agent, kiro-cli"));
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG_ERROR);
    }

    #[test]
    fn test_no_ai_command_is_error() {
        let config = config_with(Procedure::default());
        let err = config
            .resolve_ai_command(&Procedure::default(), &RunOverrides::default())
            .unwrap_err();
        assert!(matches!(err, RoodaError::MissingAiCommand { .. }));
    }

    #[test]
    fn test_max_iterations_precedence() {
        let mut config = config_with(Procedure::default());
        let mut procedure = Procedure::default();
        let mut overrides = RunOverrides::default();

        assert_eq!(config.resolve_max_iterations(&procedure, &overrides), Some(5));

        config.loop_settings.iteration_mode = IterationMode::Unlimited;
        assert_eq!(config.resolve_max_iterations(&procedure, &overrides), None);

        procedure.default_max_iterations = Some(2);
        assert_eq!(config.resolve_max_iterations(&procedure, &overrides), Some(2));

        procedure.iteration_mode = Some(IterationMode::Unlimited);
        assert_eq!(config.resolve_max_iterations(&procedure, &overrides), None);

        overrides.max_iterations = Some(7);
        assert_eq!(config.resolve_max_iterations(&procedure, &overrides), Some(7));

        overrides.unlimited = true;
        assert_eq!(config.resolve_max_iterations(&procedure, &overrides), None);
    }

    #[test]
    fn test_run_settings_prefers_procedure_overrides() {
        let mut config = config_with(Procedure {
            iteration_timeout: Some(120),
            max_output_buffer: Some(4096),
            ..Procedure::default()
        });
        config.loop_settings.iteration_timeout = Some(600);
        config.loop_settings.ai_cmd_alias = Some("claude".into());

        let settings = config.run_settings("build", &RunOverrides::default()).unwrap();
        assert_eq!(settings.iteration_timeout, Some(120));
        assert_eq!(settings.max_output_buffer, 4096);
        assert_eq!(settings.failure_threshold, 3);
        assert_eq!(settings.max_iterations, Some(5));
        assert_eq!(settings.procedure_name, "build");
    }

    #[test]
    fn test_run_settings_unknown_procedure() {
        let config = config_with(Procedure::default());
        let err = config
            .run_settings("missing", &RunOverrides::default())
            .unwrap_err();
        assert!(matches!(err, RoodaError::UnknownProcedure { .. }));
    }

    #[test]
    fn test_procedure_parses_from_toml() {
        let procedure: Procedure = toml::from_str(
            r#"
            display = "Docs"
            iteration_mode = "unlimited"
            observe = [{ path = "builtin:observe/specs.md" }]
            act = [{ content = "Write {{target}}.", parameters = { target = "README.md" } }]
            "#,
        )
        .unwrap();
        assert_eq!(procedure.iteration_mode, Some(IterationMode::Unlimited));
        assert!(procedure.observe[0].is_builtin());
        assert_eq!(
            procedure.act[0].parameters.get("target"),
            Some(&toml::Value::String("README.md".into()))
        );
        assert!(procedure.has_overrides());
    }
}
