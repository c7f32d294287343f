//! Custom error types for rooda.
//!
//! This module provides structured error types for everything around the
//! iteration loop: configuration, procedure lookup, and prompt assembly.
//! Process execution failures are not errors at this level; they are carried
//! inside [`crate::process::ExecutionResult`] and switched on by the loop.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for user errors and aborted runs.
pub const EXIT_USER_ERROR: i32 = 1;
/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: i32 = 2;
/// Exit code for failures while executing the agent command.
pub const EXIT_EXECUTION_ERROR: i32 = 3;

/// Main error type for rooda operations
#[derive(Error, Debug)]
pub enum RoodaError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Procedure name not present in the merged configuration
    #[error("unknown procedure '{name}'\n\nRun 'rooda list' to see available procedures")]
    UnknownProcedure { name: String },

    /// No AI command could be resolved for the run
    #[error("no AI command configured: {detail}")]
    MissingAiCommand { detail: String },

    // =========================================================================
    // Prompt Errors
    // =========================================================================
    /// Prompt assembly failed
    #[error("Prompt assembly error: {message}")]
    Prompt { message: String },

    /// Fragment file or built-in fragment could not be found
    #[error("fragment not found: {path}")]
    FragmentNotFound { path: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// TOML parse error wrapper
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RoodaError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error for a field
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a prompt assembly error
    pub fn prompt(message: impl Into<String>) -> Self {
        Self::Prompt {
            message: message.into(),
        }
    }

    /// Check if this error is a configuration problem
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::InvalidConfig { .. }
                | Self::MissingAiCommand { .. }
                | Self::Toml(_)
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. }
            | Self::InvalidConfig { .. }
            | Self::MissingAiCommand { .. }
            | Self::Toml(_) => EXIT_CONFIG_ERROR,
            Self::Prompt { .. } | Self::FragmentNotFound { .. } | Self::Io(_) => {
                EXIT_EXECUTION_ERROR
            }
            _ => EXIT_USER_ERROR,
        }
    }
}

/// Type alias for rooda results
pub type Result<T> = std::result::Result<T, RoodaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RoodaError::invalid("loop.failure_threshold", "must be >= 1, got 0");
        assert!(err.to_string().contains("loop.failure_threshold"));
        assert!(err.to_string().contains("must be >= 1"));
    }

    #[test]
    fn test_unknown_procedure_points_at_list() {
        let err = RoodaError::UnknownProcedure {
            name: "bogus".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'bogus'"));
        assert!(msg.contains("rooda list"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RoodaError::config("bad").exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            RoodaError::MissingAiCommand {
                detail: "none".into()
            }
            .exit_code(),
            EXIT_CONFIG_ERROR
        );
        assert_eq!(RoodaError::prompt("boom").exit_code(), EXIT_EXECUTION_ERROR);
        assert_eq!(
            RoodaError::FragmentNotFound {
                path: "prompts/missing.md".into()
            }
            .exit_code(),
            EXIT_EXECUTION_ERROR
        );
        assert_eq!(
            RoodaError::UnknownProcedure { name: "x".into() }.exit_code(),
            EXIT_USER_ERROR
        );
    }

    #[test]
    fn test_is_config_error() {
        assert!(RoodaError::config("bad").is_config_error());
        assert!(RoodaError::invalid("a", "b").is_config_error());
        assert!(!RoodaError::prompt("x").is_config_error());
    }

    #[test]
    fn test_config_with_path() {
        let path = PathBuf::from("/test/rooda-config.toml");
        let err = RoodaError::config_with_path("failed to parse", path.clone());
        if let RoodaError::Config {
            message,
            path: opt_path,
        } = err
        {
            assert_eq!(message, "failed to parse");
            assert_eq!(opt_path, Some(path));
        } else {
            panic!("Wrong error variant");
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: RoodaError = io_err.into();
        assert!(matches!(err, RoodaError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
