//! Shell Specifications
//!
//! Static, per-shell description of how to spawn the shell, how to customize
//! its prompt and how to sandwich a command between boundary markers.

use serde::{Deserialize, Serialize};

use crate::boundary::BoundaryDetector;
use crate::error::Result;
use crate::models::{Dialect, ShellType};

/// How the end of a command is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStrategy {
    /// Command is wrapped so it prints both markers itself
    Sandwich,
    /// Shell prompt is rewritten to print the close marker when the shell is ready again
    Prompt,
}

const SANDWICH_ONLY: &[DetectionStrategy] = &[DetectionStrategy::Sandwich];
const SANDWICH_AND_PROMPT: &[DetectionStrategy] =
    &[DetectionStrategy::Sandwich, DetectionStrategy::Prompt];

/// Immutable description of one supported shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSpecification {
    shell_type: ShellType,
    program: String,
    args: Option<Vec<String>>,
}

impl ShellSpecification {
    /// Look up the specification for a shell name or executable path
    pub fn for_kind(kind: &str) -> Result<Self> {
        Ok(Self::for_shell(ShellType::from_name(kind)?))
    }

    /// Built-in specification for a shell type
    pub fn for_shell(shell_type: ShellType) -> Self {
        Self {
            shell_type,
            program: default_program(shell_type).to_string(),
            args: None,
        }
    }

    /// Replace the executable used to spawn the shell
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Replace the spawn arguments for both PTY and pipe sessions
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = Some(args);
        self
    }

    pub fn shell_type(&self) -> ShellType {
        self.shell_type
    }

    pub fn dialect(&self) -> Dialect {
        self.shell_type.dialect()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn line_ending(&self) -> &'static str {
        self.dialect().line_ending()
    }

    /// Spawn arguments; PTY sessions run the shell interactively
    pub fn args(&self, use_pty: bool) -> Vec<String> {
        if let Some(args) = &self.args {
            return args.clone();
        }
        let args: &[&str] = match (self.shell_type, use_pty) {
            (ShellType::Bash, _) => &["--noprofile", "--norc"],
            (ShellType::Zsh, _) => &["-f"],
            (ShellType::Sh | ShellType::Dash | ShellType::Ksh, _) => &[],
            (ShellType::Fish, _) => &["--no-config"],
            (ShellType::PowerShell, true) => &["-NoLogo", "-NoProfile"],
            (ShellType::PowerShell, false) => &["-NoLogo", "-NoProfile", "-Command", "-"],
            (ShellType::Cmd, _) => &["/Q"],
        };
        args.iter().map(|s| s.to_string()).collect()
    }

    /// Detection strategies this shell can support
    pub fn strategies(&self) -> &'static [DetectionStrategy] {
        if self.supports_prompt() {
            SANDWICH_AND_PROMPT
        } else {
            SANDWICH_ONLY
        }
    }

    /// Strategy used when the caller expresses no preference
    pub fn default_strategy(&self) -> DetectionStrategy {
        match self.shell_type {
            ShellType::Fish | ShellType::PowerShell => DetectionStrategy::Prompt,
            _ => DetectionStrategy::Sandwich,
        }
    }

    /// Whether the shell exposes a prompt hook that can print the exit status
    pub fn supports_prompt(&self) -> bool {
        matches!(
            self.shell_type,
            ShellType::Bash | ShellType::Zsh | ShellType::Fish | ShellType::PowerShell
        )
    }

    /// Statement that makes the shell prompt print `<close> <status> `.
    ///
    /// `None` for shells without a reliable way to put the last exit status
    /// into the prompt.
    pub fn prompt_command(&self, detector: &BoundaryDetector) -> Option<String> {
        let (c1, c2) = detector.close_halves();
        match self.shell_type {
            ShellType::Bash => Some(format!("PS1='{}''{} $? '", c1, c2)),
            ShellType::Zsh => Some(format!("PROMPT='{}''{} %? '", c1, c2)),
            ShellType::Fish => Some(format!(
                "function fish_prompt; printf '%s%s %s ' '{}' '{}' $status; end",
                c1, c2
            )),
            ShellType::PowerShell => Some(format!(
                "function global:prompt {{ $c = if ($?) {{ 0 }} else {{ 1 }}; \
                 if ($global:LASTEXITCODE) {{ $c = $global:LASTEXITCODE }}; \
                 '{}' + '{}' + ' ' + $c + ' ' }}",
                c1, c2
            )),
            ShellType::Sh | ShellType::Dash | ShellType::Ksh | ShellType::Cmd => None,
        }
    }

    /// Sandwich `command` between the detector's markers
    pub fn command_wrap(&self, command: &str, detector: &BoundaryDetector) -> String {
        self.dialect().sandwich(command, detector)
    }

    /// Quote `text` as a single literal word for this shell
    pub fn escape_for_shell(&self, text: &str) -> String {
        self.dialect().escape(text)
    }
}

fn default_program(shell_type: ShellType) -> &'static str {
    match shell_type {
        ShellType::Bash => "bash",
        ShellType::Zsh => "zsh",
        ShellType::Sh => "sh",
        ShellType::Dash => "dash",
        ShellType::Ksh => "ksh",
        ShellType::Fish => "fish",
        ShellType::PowerShell => {
            if cfg!(windows) {
                "powershell.exe"
            } else {
                "pwsh"
            }
        }
        ShellType::Cmd => "cmd.exe",
    }
}
