//! Tiered configuration loading.
//!
//! Settings are merged from four tiers, later tiers winning:
//!
//! 1. **Built-in** - defaults, built-in aliases and the injected procedure catalog
//! 2. **Global** - `rooda-config.toml` in `$ROODA_CONFIG_HOME`, else
//!    `$XDG_CONFIG_HOME/rooda`, else the platform config directory
//! 3. **Workspace** - `./rooda-config.toml`, or the file given with `--config`
//! 4. **Environment** - `ROODA_LOOP_*` variables
//!
//! Command-line flags are applied afterwards, per run, by
//! [`RoodaConfig::run_settings`](super::RoodaConfig::run_settings).
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rooda::config::ConfigLoader;
//! use rooda::procedures::BuiltinCatalog;
//!
//! let (config, chain) = ConfigLoader::new(Arc::new(BuiltinCatalog::new())).load_with_chain()?;
//! tracing::debug!("{}", chain.describe());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::{
    IterationMode, LogLevel, LoopSettings, Procedure, ProcedureCatalog, RoodaConfig,
    TimestampFormat, BUILTIN_PREFIX, CONFIG_FILE_NAME,
};
use crate::error::{Result, RoodaError};

/// Prefix of environment variables that override loop settings.
pub const ENV_PREFIX: &str = "ROODA_LOOP_";

// ============================================================================
// Configuration Tier
// ============================================================================

/// A tier in the configuration hierarchy, lowest priority first.
///
/// # Example
///
/// ```rust
/// use rooda::config::ConfigTier;
///
/// assert!(ConfigTier::BuiltIn < ConfigTier::Global);
/// assert!(ConfigTier::Workspace < ConfigTier::Environment);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigTier {
    BuiltIn,
    Global,
    Workspace,
    Environment,
}

impl fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuiltIn => write!(f, "built-in"),
            Self::Global => write!(f, "global"),
            Self::Workspace => write!(f, "workspace"),
            Self::Environment => write!(f, "environment"),
        }
    }
}

/// One tier that was consulted while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub tier: ConfigTier,
    /// File backing the tier, if it is file based.
    pub path: Option<PathBuf>,
    /// Whether the tier contributed anything.
    pub loaded: bool,
}

/// The tiers consulted during a load, in merge order.
#[derive(Debug, Clone, Default)]
pub struct LoadChain {
    pub sources: Vec<ConfigSource>,
}

impl LoadChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, tier: ConfigTier, path: Option<PathBuf>, loaded: bool) {
        self.sources.push(ConfigSource { tier, path, loaded });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.sources.iter().filter(|s| s.loaded).count()
    }

    /// Multi-line description for debug logging.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut lines = vec!["Configuration tiers:".to_string()];
        for source in &self.sources {
            let status = if source.loaded { "+" } else { "-" };
            match &source.path {
                Some(path) => lines.push(format!(
                    "  {} [{}] {}",
                    status,
                    source.tier,
                    path.display()
                )),
                None => lines.push(format!("  {} [{}]", status, source.tier)),
            }
        }
        lines.join("\n")
    }
}

// ============================================================================
// File schema
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    #[serde(rename = "loop")]
    loop_settings: LoopFile,
    ai_cmd_aliases: BTreeMap<String, String>,
    procedures: BTreeMap<String, Procedure>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoopFile {
    iteration_mode: Option<IterationMode>,
    default_max_iterations: Option<u32>,
    iteration_timeout: Option<u64>,
    max_output_buffer: Option<usize>,
    failure_threshold: Option<u32>,
    log_level: Option<LogLevel>,
    log_timestamp_format: Option<TimestampFormat>,
    show_ai_output: Option<bool>,
    ai_cmd: Option<String>,
    ai_cmd_alias: Option<String>,
}

impl LoopFile {
    fn apply(self, settings: &mut LoopSettings) {
        if let Some(v) = self.iteration_mode {
            settings.iteration_mode = v;
        }
        if let Some(v) = self.default_max_iterations {
            settings.default_max_iterations = Some(v);
        }
        if let Some(v) = self.iteration_timeout {
            settings.iteration_timeout = Some(v);
        }
        if let Some(v) = self.max_output_buffer {
            settings.max_output_buffer = v;
        }
        if let Some(v) = self.failure_threshold {
            settings.failure_threshold = v;
        }
        if let Some(v) = self.log_level {
            settings.log_level = v;
        }
        if let Some(v) = self.log_timestamp_format {
            settings.log_timestamp_format = v;
        }
        if let Some(v) = self.show_ai_output {
            settings.show_ai_output = v;
        }
        if let Some(v) = non_empty(self.ai_cmd) {
            settings.ai_cmd = Some(v);
        }
        if let Some(v) = non_empty(self.ai_cmd_alias) {
            settings.ai_cmd_alias = Some(v);
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Loader
// ============================================================================

/// Loads and merges configuration tiers.
pub struct ConfigLoader {
    catalog: Arc<dyn ProcedureCatalog>,
    global_dir: Option<PathBuf>,
    workspace_file: PathBuf,
    workspace_explicit: bool,
    env: BTreeMap<String, String>,
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("catalog", &"<dyn ProcedureCatalog>")
            .field("global_dir", &self.global_dir)
            .field("workspace_file", &self.workspace_file)
            .field("workspace_explicit", &self.workspace_explicit)
            .field("env", &self.env)
            .finish()
    }
}

impl ConfigLoader {
    /// Loader reading the real environment and the current directory.
    #[must_use]
    pub fn new(catalog: Arc<dyn ProcedureCatalog>) -> Self {
        Self {
            catalog,
            global_dir: global_config_dir(|key| std::env::var(key).ok()),
            workspace_file: PathBuf::from(CONFIG_FILE_NAME),
            workspace_explicit: false,
            env: std::env::vars()
                .filter(|(key, _)| key.starts_with(ENV_PREFIX))
                .collect(),
        }
    }

    /// Override the global config directory; `None` skips the global tier.
    #[must_use]
    pub fn with_global_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.global_dir = dir;
        self
    }

    /// Look for `rooda-config.toml` in `dir` instead of the current directory.
    #[must_use]
    pub fn with_workspace_dir(mut self, dir: &Path) -> Self {
        self.workspace_file = dir.join(CONFIG_FILE_NAME);
        self.workspace_explicit = false;
        self
    }

    /// Use `path` as the workspace file. It must exist.
    #[must_use]
    pub fn with_workspace_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace_file = path.into();
        self.workspace_explicit = true;
        self
    }

    /// Replace the environment snapshot.
    #[must_use]
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    #[must_use]
    pub fn global_dir(&self) -> Option<&Path> {
        self.global_dir.as_deref()
    }

    #[must_use]
    pub fn workspace_file(&self) -> &Path {
        &self.workspace_file
    }

    /// Load the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read or parsed, if an
    /// explicitly requested workspace file is missing, or if an environment
    /// override cannot be parsed. Missing implicit files are skipped.
    pub fn load(&self) -> Result<RoodaConfig> {
        Ok(self.load_with_chain()?.0)
    }

    /// Load the merged configuration and report which tiers contributed.
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::load`].
    pub fn load_with_chain(&self) -> Result<(RoodaConfig, LoadChain)> {
        let mut config = RoodaConfig::builtin(self.catalog.as_ref());
        let mut chain = LoadChain::new();
        chain.add_source(ConfigTier::BuiltIn, None, true);

        if let Some(dir) = &self.global_dir {
            let path = dir.join(CONFIG_FILE_NAME);
            let loaded = merge_file(&mut config, &path)?;
            chain.add_source(ConfigTier::Global, Some(path), loaded);
        }

        if self.workspace_explicit && !self.workspace_file.is_file() {
            return Err(RoodaError::config_with_path(
                format!("config file not found: {}", self.workspace_file.display()),
                self.workspace_file.clone(),
            ));
        }
        let loaded = merge_file(&mut config, &self.workspace_file)?;
        chain.add_source(ConfigTier::Workspace, Some(self.workspace_file.clone()), loaded);

        let applied = apply_env(&mut config.loop_settings, &self.env)?;
        chain.add_source(ConfigTier::Environment, None, applied > 0);

        debug!("{}", chain.describe());
        Ok((config, chain))
    }
}

/// Resolve the global configuration directory.
///
/// `lookup` reads environment variables, so callers and tests can supply
/// their own view of the environment.
pub fn global_config_dir(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(dir) = lookup("ROODA_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    if let Some(xdg) = lookup("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(xdg).join("rooda"));
    }
    dirs::config_dir().map(|dir| dir.join("rooda"))
}

/// Merge one file tier. Returns `false` if the file does not exist.
fn merge_file(config: &mut RoodaConfig, path: &Path) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        RoodaError::config_with_path(
            format!("failed to read {}: {}", path.display(), e),
            path.to_path_buf(),
        )
    })?;
    let file: ConfigFile = toml::from_str(&content).map_err(|e| {
        RoodaError::config_with_path(format!("{}: {}", path.display(), e), path.to_path_buf())
    })?;

    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    file.loop_settings.apply(&mut config.loop_settings);
    config.ai_cmd_aliases.extend(file.ai_cmd_aliases);
    for (name, mut procedure) in file.procedures {
        resolve_fragment_paths(&mut procedure, base_dir);
        config.procedures.entry(name).or_default().merge(procedure);
    }

    debug!(path = %path.display(), "merged config file");
    Ok(true)
}

/// Make relative fragment paths relative to the declaring file's directory.
fn resolve_fragment_paths(procedure: &mut Procedure, base_dir: &Path) {
    for phase in [
        &mut procedure.observe,
        &mut procedure.orient,
        &mut procedure.decide,
        &mut procedure.act,
    ] {
        for fragment in phase.iter_mut() {
            if let Some(path) = fragment.path.as_mut() {
                if !path.starts_with(BUILTIN_PREFIX) && !Path::new(path.as_str()).is_absolute() {
                    *path = base_dir.join(path.as_str()).to_string_lossy().into_owned();
                }
            }
        }
    }
}

/// Apply `ROODA_LOOP_*` overrides. Returns how many were applied.
fn apply_env(settings: &mut LoopSettings, env: &BTreeMap<String, String>) -> Result<usize> {
    let mut applied = 0;

    for (key, value) in env {
        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        if value.trim().is_empty() {
            continue;
        }

        match name {
            "AI_CMD" => settings.ai_cmd = Some(value.clone()),
            "AI_CMD_ALIAS" => settings.ai_cmd_alias = Some(value.clone()),
            "ITERATION_MODE" => settings.iteration_mode = choice(key, value, IterationMode::NAMES)?,
            "DEFAULT_MAX_ITERATIONS" => settings.default_max_iterations = Some(number(key, value)?),
            "ITERATION_TIMEOUT" => settings.iteration_timeout = Some(number(key, value)?),
            "MAX_OUTPUT_BUFFER" => settings.max_output_buffer = number(key, value)?,
            "FAILURE_THRESHOLD" => settings.failure_threshold = number(key, value)?,
            "LOG_LEVEL" => settings.log_level = choice(key, value, LogLevel::NAMES)?,
            "LOG_TIMESTAMP_FORMAT" => {
                settings.log_timestamp_format = choice(key, value, TimestampFormat::NAMES)?;
            }
            "SHOW_AI_OUTPUT" => settings.show_ai_output = boolean(key, value)?,
            _ => {
                debug!(key = %key, "ignoring unknown environment override");
                continue;
            }
        }
        debug!(key = %key, "applied environment override");
        applied += 1;
    }

    Ok(applied)
}

fn number<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RoodaError::invalid(key, format!("'{}' is not a valid number: {}", value, e)))
}

fn choice<T: FromStr>(key: &str, value: &str, names: &[&str]) -> Result<T> {
    value.trim().parse().map_err(|_| {
        RoodaError::invalid(
            key,
            format!("'{}' is not one of: {}", value, names.join(", ")),
        )
    })
}

fn boolean(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "no" | "off" => Ok(false),
        _ => Err(RoodaError::invalid(
            key,
            format!("'{}' is not a boolean (use true or false)", value),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FragmentAction;
    use std::fs;
    use tempfile::TempDir;

    struct OneProcedure;

    impl ProcedureCatalog for OneProcedure {
        fn procedures(&self) -> BTreeMap<String, Procedure> {
            let mut map = BTreeMap::new();
            map.insert(
                "build".to_string(),
                Procedure {
                    display: "Build".into(),
                    summary: "Implement".into(),
                    act: vec![FragmentAction::from_path("builtin:act/build.md")],
                    ..Procedure::default()
                },
            );
            map
        }

        fn fragment(&self, _path: &str) -> Option<String> {
            None
        }
    }

    fn loader(global: &TempDir, workspace: &TempDir) -> ConfigLoader {
        ConfigLoader::new(Arc::new(OneProcedure))
            .with_global_dir(Some(global.path().to_path_buf()))
            .with_workspace_dir(workspace.path())
            .with_env(Vec::<(String, String)>::new())
    }

    fn dirs() -> (TempDir, TempDir) {
        (TempDir::new().unwrap(), TempDir::new().unwrap())
    }

    #[test]
    fn test_builtin_only() {
        let (global, workspace) = dirs();
        let (config, chain) = loader(&global, &workspace).load_with_chain().unwrap();

        assert_eq!(config.loop_settings, LoopSettings::default());
        assert!(config.procedures.contains_key("build"));
        assert!(config.ai_cmd_aliases.contains_key("claude"));
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.loaded_count(), 1);
    }

    #[test]
    fn test_workspace_overrides_global() {
        let (global, workspace) = dirs();
        fs::write(
            global.path().join(CONFIG_FILE_NAME),
            "[loop]\nfailure_threshold = 7\ndefault_max_iterations = 9\n",
        )
        .unwrap();
        fs::write(
            workspace.path().join(CONFIG_FILE_NAME),
            "[loop]\nfailure_threshold = 2\n",
        )
        .unwrap();

        let (config, chain) = loader(&global, &workspace).load_with_chain().unwrap();

        assert_eq!(config.loop_settings.failure_threshold, 2);
        assert_eq!(config.loop_settings.default_max_iterations, Some(9));
        assert_eq!(chain.loaded_count(), 3);
        assert!(chain.describe().contains("[workspace]"));
    }

    #[test]
    fn test_procedures_merge_field_by_field() {
        let (global, workspace) = dirs();
        fs::write(
            workspace.path().join(CONFIG_FILE_NAME),
            r#"
[procedures.build]
summary = "Project build"
iteration_timeout = 300

[procedures.docs]
display = "Docs"
observe = [{ path = "fragments/read.md" }, { path = "builtin:observe/specs.md" }]
"#,
        )
        .unwrap();

        let config = loader(&global, &workspace).load().unwrap();

        let build = &config.procedures["build"];
        assert_eq!(build.display, "Build");
        assert_eq!(build.summary, "Project build");
        assert_eq!(build.iteration_timeout, Some(300));
        assert_eq!(build.act.len(), 1);

        let docs = &config.procedures["docs"];
        let resolved = docs.observe[0].path.as_deref().unwrap();
        assert_eq!(
            PathBuf::from(resolved),
            workspace.path().join("fragments/read.md")
        );
        assert_eq!(docs.observe[1].path.as_deref(), Some("builtin:observe/specs.md"));
    }

    #[test]
    fn test_aliases_extend_builtins() {
        let (global, workspace) = dirs();
        fs::write(
            global.path().join(CONFIG_FILE_NAME),
            "[ai_cmd_aliases]\nlocal = \"my-agent --yes\"\nclaude = \"claude -p\"\n",
        )
        .unwrap();

        let config = loader(&global, &workspace).load().unwrap();

        assert_eq!(config.ai_cmd_aliases["local"], "my-agent --yes");
        assert_eq!(config.ai_cmd_aliases["claude"], "claude -p");
        assert!(config.ai_cmd_aliases.contains_key("copilot"));
    }

    #[test]
    fn test_env_overrides_files() {
        let (global, workspace) = dirs();
        fs::write(
            workspace.path().join(CONFIG_FILE_NAME),
            "[loop]\nlog_level = \"warn\"\nshow_ai_output = false\n",
        )
        .unwrap();

        let config = loader(&global, &workspace)
            .with_env([
                ("ROODA_LOOP_LOG_LEVEL", "debug"),
                ("ROODA_LOOP_SHOW_AI_OUTPUT", "true"),
                ("ROODA_LOOP_ITERATION_TIMEOUT", "45"),
                ("ROODA_LOOP_ITERATION_MODE", "unlimited"),
                ("ROODA_LOOP_AI_CMD_ALIAS", "copilot"),
                ("ROODA_LOOP_UNRELATED", "x"),
            ])
            .load()
            .unwrap();

        assert_eq!(config.loop_settings.log_level, LogLevel::Debug);
        assert!(config.loop_settings.show_ai_output);
        assert_eq!(config.loop_settings.iteration_timeout, Some(45));
        assert_eq!(config.loop_settings.iteration_mode, IterationMode::Unlimited);
        assert_eq!(config.loop_settings.ai_cmd_alias.as_deref(), Some("copilot"));
    }

    #[test]
    fn test_invalid_env_value_names_variable() {
        let (global, workspace) = dirs();
        let err = loader(&global, &workspace)
            .with_env([("ROODA_LOOP_FAILURE_THRESHOLD", "three")])
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("ROODA_LOOP_FAILURE_THRESHOLD"));
        assert!(err.is_config_error());

        let err = loader(&global, &workspace)
            .with_env([("ROODA_LOOP_LOG_TIMESTAMP_FORMAT", "epoch")])
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("time, time-ms, relative, iso, none"));
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let (global, workspace) = dirs();
        let path = workspace.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[loop\nbroken").unwrap();

        let err = loader(&global, &workspace).load().unwrap_err();

        assert!(matches!(err, RoodaError::Config { path: Some(ref p), .. } if *p == path));
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG_ERROR);
    }

    #[test]
    fn test_unknown_enum_value_in_file_is_error() {
        let (global, workspace) = dirs();
        fs::write(
            workspace.path().join(CONFIG_FILE_NAME),
            "[loop]\nlog_level = \"chatty\"\n",
        )
        .unwrap();
        assert!(loader(&global, &workspace).load().is_err());
    }

    #[test]
    fn test_explicit_workspace_file_must_exist() {
        let (global, workspace) = dirs();
        let err = loader(&global, &workspace)
            .with_workspace_file(workspace.path().join("custom.toml"))
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_explicit_workspace_file_resolves_relative_fragments() {
        let (global, workspace) = dirs();
        let nested = workspace.path().join("conf");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("custom.toml");
        fs::write(
            &file,
            "[procedures.x]\nact = [{ path = \"act.md\" }]\n",
        )
        .unwrap();

        let config = loader(&global, &workspace)
            .with_workspace_file(&file)
            .load()
            .unwrap();

        assert_eq!(
            PathBuf::from(config.procedures["x"].act[0].path.as_deref().unwrap()),
            nested.join("act.md")
        );
    }

    #[test]
    fn test_global_dir_resolution_order() {
        let env = |pairs: &'static [(&'static str, &'static str)]| {
            move |key: &str| {
                pairs
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
            }
        };

        assert_eq!(
            global_config_dir(env(&[("ROODA_CONFIG_HOME", "/a"), ("XDG_CONFIG_HOME", "/b")])),
            Some(PathBuf::from("/a"))
        );
        assert_eq!(
            global_config_dir(env(&[("XDG_CONFIG_HOME", "/b")])),
            Some(PathBuf::from("/b/rooda"))
        );
        assert_eq!(
            global_config_dir(env(&[("ROODA_CONFIG_HOME", ""), ("XDG_CONFIG_HOME", "/b")])),
            Some(PathBuf::from("/b/rooda"))
        );
    }

    #[test]
    fn test_boolean_parsing() {
        assert!(boolean("K", "TRUE").unwrap());
        assert!(boolean("K", "1").unwrap());
        assert!(!boolean("K", "off").unwrap());
        assert!(boolean("K", "maybe").is_err());
    }
}
