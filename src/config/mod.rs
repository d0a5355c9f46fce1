//! Engine configuration
//!
//! Session defaults, boundary-detection tuning and per-shell program
//! overrides. Every section falls back to defaults field by field, so a
//! config file only needs the values it changes.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::boundary::{ParserOptions, StrategyPreference};
use crate::error::{Error, Result};
use crate::models::ShellType;
use crate::shell::ShellSpecification;

pub use loader::{ConfigFormat, ConfigLoader};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Defaults for newly created sessions
    pub session: SessionConfig,

    /// Boundary detection tuning
    pub detection: DetectionConfig,

    /// Program/argument overrides keyed by shell name
    pub shells: HashMap<String, ShellOverride>,
}

/// Session defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Shell used when the caller does not name one
    pub default_shell: String,

    /// Spawn local shells on a PTY instead of pipes
    pub use_pty: bool,

    /// Buffered events per session before slow subscribers lag
    pub event_capacity: usize,

    /// Working directory for new shells (inherited when unset)
    pub working_directory: Option<PathBuf>,

    /// Start from the engine's own environment
    pub inherit_env: bool,

    /// PTY rows
    pub pty_rows: u16,

    /// PTY columns
    pub pty_cols: u16,

    /// Extra environment variables for new shells
    pub environment: HashMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_shell: if cfg!(windows) { "powershell" } else { "bash" }.to_string(),
            use_pty: false,
            event_capacity: 1024,
            working_directory: None,
            inherit_env: true,
            pty_rows: 24,
            pty_cols: 80,
            environment: HashMap::new(),
        }
    }
}

/// Boundary detection tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Detection strategy preference
    pub strategy: StrategyPreference,

    /// Give up on the close marker after this long (0 = wait forever)
    pub command_timeout_ms: u64,

    /// How long to keep reading output after the shell exits
    pub exit_grace_ms: u64,

    /// Cap on the captured output of one command
    pub max_output_bytes: usize,

    /// Rewrite CRLF line endings to LF
    pub normalize_crlf: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyPreference::Auto,
            command_timeout_ms: 0,
            exit_grace_ms: 250,
            max_output_bytes: 10 * 1024 * 1024, // 10MB
            normalize_crlf: true,
        }
    }
}

impl DetectionConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        match self.command_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }

    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            normalize_crlf: self.normalize_crlf,
            max_output_bytes: self.max_output_bytes,
        }
    }
}

/// Replacement program and/or arguments for one shell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellOverride {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
}

impl EngineConfig {
    /// Shell specification for `shell_kind` with any configured override applied
    pub fn shell_spec(&self, shell_kind: &str) -> Result<ShellSpecification> {
        let mut spec = ShellSpecification::for_kind(shell_kind)?;
        let shell_type = spec.shell_type();
        let overrides = self
            .shells
            .iter()
            .find(|(name, _)| ShellType::from_name(name).ok() == Some(shell_type));
        if let Some((_, shell)) = overrides {
            if let Some(program) = &shell.program {
                spec = spec.with_program(program.clone());
            }
            if let Some(args) = &shell.args {
                spec = spec.with_args(args.clone());
            }
        }
        Ok(spec)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.session.default_shell.trim().is_empty() {
            return Err(Error::ConfigValidationFailed {
                field: "session.default_shell".to_string(),
                reason: "Default shell cannot be empty".to_string(),
            });
        }

        if ShellType::from_name(&self.session.default_shell).is_err() {
            return Err(Error::ConfigValidationFailed {
                field: "session.default_shell".to_string(),
                reason: format!("Unsupported shell '{}'", self.session.default_shell),
            });
        }

        if self.session.event_capacity == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "session.event_capacity".to_string(),
                reason: "Event capacity must be greater than 0".to_string(),
            });
        }

        if self.session.pty_rows == 0 || self.session.pty_cols == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "session.pty_rows".to_string(),
                reason: "PTY size must be at least 1x1".to_string(),
            });
        }

        if self.detection.max_output_bytes == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "detection.max_output_bytes".to_string(),
                reason: "Output limit must be greater than 0".to_string(),
            });
        }

        for (name, shell) in &self.shells {
            if name.trim().is_empty() {
                return Err(Error::ConfigValidationFailed {
                    field: "shells".to_string(),
                    reason: "Shell name cannot be empty".to_string(),
                });
            }
            if ShellType::from_name(name).is_err() {
                return Err(Error::ConfigValidationFailed {
                    field: format!("shells.{}", name),
                    reason: format!("Unsupported shell '{}'", name),
                });
            }
            if matches!(&shell.program, Some(program) if program.trim().is_empty()) {
                return Err(Error::ConfigValidationFailed {
                    field: format!("shells.{}.program", name),
                    reason: "Shell program cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
