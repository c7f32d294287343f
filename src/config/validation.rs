//! Validation of merged configuration.
//!
//! Runs after every tier has been merged, so messages name the setting key
//! rather than the file it came from. The first problem found is returned.

use std::path::{Path, PathBuf};

use super::{Procedure, RoodaConfig};
use crate::error::{Result, RoodaError};

/// Smallest accepted output buffer.
pub const MIN_OUTPUT_BUFFER: usize = 1024;

/// Validate the merged configuration.
///
/// # Errors
///
/// Returns [`RoodaError::InvalidConfig`] naming the offending key.
pub fn validate(config: &RoodaConfig) -> Result<()> {
    let settings = &config.loop_settings;

    if let Some(n) = settings.default_max_iterations {
        at_least("loop.default_max_iterations", u64::from(n), 1, "")?;
    }
    if let Some(secs) = settings.iteration_timeout {
        at_least("loop.iteration_timeout", secs, 1, " second")?;
    }
    at_least(
        "loop.max_output_buffer",
        settings.max_output_buffer as u64,
        MIN_OUTPUT_BUFFER as u64,
        " bytes",
    )?;
    at_least(
        "loop.failure_threshold",
        u64::from(settings.failure_threshold),
        1,
        "",
    )?;
    if let Some(cmd) = &settings.ai_cmd {
        validate_ai_command("loop.ai_cmd", cmd)?;
    }

    for (name, procedure) in &config.procedures {
        validate_procedure(name, procedure)?;
    }
    Ok(())
}

fn validate_procedure(name: &str, procedure: &Procedure) -> Result<()> {
    let key = |field: &str| format!("procedures.{}.{}", name, field);

    if let Some(n) = procedure.default_max_iterations {
        at_least(&key("default_max_iterations"), u64::from(n), 1, "")?;
    }
    if let Some(secs) = procedure.iteration_timeout {
        at_least(&key("iteration_timeout"), secs, 1, " second")?;
    }
    if let Some(bytes) = procedure.max_output_buffer {
        at_least(
            &key("max_output_buffer"),
            bytes as u64,
            MIN_OUTPUT_BUFFER as u64,
            " bytes",
        )?;
    }
    if let Some(cmd) = &procedure.ai_cmd {
        validate_ai_command(&key("ai_cmd"), cmd)?;
    }

    for (phase, fragments) in procedure.phases() {
        for (i, fragment) in fragments.iter().enumerate() {
            match (&fragment.content, &fragment.path) {
                (None, None) => {
                    return Err(RoodaError::invalid(
                        key(phase),
                        format!("fragment {} must set either content or path", i + 1),
                    ))
                }
                (Some(_), Some(_)) => {
                    return Err(RoodaError::invalid(
                        key(phase),
                        format!("fragment {} sets both content and path", i + 1),
                    ))
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn at_least(key: &str, value: u64, min: u64, unit: &str) -> Result<()> {
    if value < min {
        return Err(RoodaError::invalid(
            key,
            format!("must be >= {}{}, got {}", min, unit, value),
        ));
    }
    Ok(())
}

/// Check that the command's program exists and is executable.
///
/// # Errors
///
/// Returns [`RoodaError::InvalidConfig`] if the command is empty, cannot be
/// split, or its program cannot be found or run.
pub fn validate_ai_command(key: &str, command: &str) -> Result<()> {
    let argv = shell_words::split(command)
        .map_err(|e| RoodaError::invalid(key, format!("cannot parse '{}': {}", command, e)))?;
    let Some(program) = argv.first() else {
        return Err(RoodaError::invalid(key, "command is empty"));
    };

    let path = if let Some(rest) = program.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| RoodaError::invalid(key, "cannot expand ~: no home directory"))?
    } else if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        PathBuf::from(program)
    } else {
        which::which(program).map_err(|_| {
            RoodaError::invalid(
                key,
                format!(
                    "command '{}' not found in PATH. Install it, use an absolute path, or add it to PATH",
                    program
                ),
            )
        })?
    };

    check_executable(key, &path)
}

fn check_executable(key: &str, path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RoodaError::invalid(key, format!("binary '{}' does not exist", path.display()))
        } else {
            RoodaError::invalid(
                key,
                format!("cannot access binary '{}': {}", path.display(), e),
            )
        }
    })?;

    if !metadata.is_file() {
        return Err(RoodaError::invalid(
            key,
            format!("binary '{}' is not a regular file", path.display()),
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(RoodaError::invalid(
                key,
                format!(
                    "binary '{}' is not executable (try: chmod +x {})",
                    path.display(),
                    path.display()
                ),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FragmentAction, LoopSettings};

    fn valid() -> RoodaConfig {
        RoodaConfig {
            loop_settings: LoopSettings::default(),
            ..RoodaConfig::default()
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&valid()).is_ok());
    }

    #[test]
    fn test_loop_bounds() {
        let mut config = valid();
        config.loop_settings.default_max_iterations = Some(0);
        let msg = validate(&config).unwrap_err().to_string();
        assert!(msg.contains("loop.default_max_iterations"));
        assert!(msg.contains("must be >= 1, got 0"));

        let mut config = valid();
        config.loop_settings.iteration_timeout = Some(0);
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("must be >= 1 second"));

        let mut config = valid();
        config.loop_settings.max_output_buffer = 1023;
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("must be >= 1024 bytes, got 1023"));

        let mut config = valid();
        config.loop_settings.failure_threshold = 0;
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("loop.failure_threshold"));
    }

    #[test]
    fn test_procedure_bounds_name_procedure() {
        let mut config = valid();
        config.procedures.insert(
            "docs".into(),
            Procedure {
                max_output_buffer: Some(10),
                ..Procedure::default()
            },
        );
        let msg = validate(&config).unwrap_err().to_string();
        assert!(msg.contains("procedures.docs.max_output_buffer"));
    }

    #[test]
    fn test_fragment_needs_exactly_one_source() {
        let mut config = valid();
        config.procedures.insert(
            "docs".into(),
            Procedure {
                orient: vec![FragmentAction::default()],
                ..Procedure::default()
            },
        );
        let msg = validate(&config).unwrap_err().to_string();
        assert!(msg.contains("procedures.docs.orient"));
        assert!(msg.contains("either content or path"));

        let mut both = FragmentAction::inline("x");
        both.path = Some("y.md".into());
        config.procedures.insert(
            "docs".into(),
            Procedure {
                act: vec![both],
                ..Procedure::default()
            },
        );
        assert!(validate(&config)
            .unwrap_err()
            .to_string()
            .contains("both content and path"));
    }

    #[test]
    fn test_ai_command_not_on_path() {
        let err = validate_ai_command("loop.ai_cmd", "rooda-no-such-agent --flag").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("loop.ai_cmd"));
        assert!(msg.contains("not found in PATH"));
    }

    #[test]
    fn test_ai_command_empty() {
        assert!(validate_ai_command("loop.ai_cmd", "   ")
            .unwrap_err()
            .to_string()
            .contains("empty"));
    }

    #[cfg(unix)]
    #[test]
    fn test_ai_command_executable_checks() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("agent.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

        let cmd = format!("{} --yes", script.display());
        assert!(validate_ai_command("k", &cmd)
            .unwrap_err()
            .to_string()
            .contains("not executable"));

        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(validate_ai_command("k", &cmd).is_ok());

        let dir_cmd = dir.path().display().to_string();
        assert!(validate_ai_command("k", &dir_cmd)
            .unwrap_err()
            .to_string()
            .contains("not a regular file"));

        let missing = dir.path().join("missing").display().to_string();
        assert!(validate_ai_command("k", &missing)
            .unwrap_err()
            .to_string()
            .contains("does not exist"));
    }

    #[cfg(unix)]
    #[test]
    fn test_ai_command_on_path() {
        assert!(validate_ai_command("k", "sh -c true").is_ok());
    }
}
