//! Command Wrapper
//!
//! Turns a raw user command into the exact line written to the shell, so the
//! command's output ends up between the detector's markers.

use serde::{Deserialize, Serialize};

use super::BoundaryDetector;
use crate::models::Dialect;
use crate::shell::{DetectionStrategy, ShellSpecification};

/// Caller preference for the detection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyPreference {
    /// Use the shell's default when it can be honored
    #[default]
    Auto,
    /// Always sandwich
    Sandwich,
    /// Prompt when possible, sandwich otherwise
    Prompt,
}

/// Decide how the end of a command will be detected.
///
/// Prompts are only drawn by interactive shells, so the prompt strategy
/// requires a PTY-backed session and a shell with a prompt hook.
pub fn select_strategy(
    spec: &ShellSpecification,
    use_pty: bool,
    preference: StrategyPreference,
) -> DetectionStrategy {
    if !use_pty || !spec.supports_prompt() {
        return DetectionStrategy::Sandwich;
    }
    match preference {
        StrategyPreference::Sandwich => DetectionStrategy::Sandwich,
        StrategyPreference::Prompt => DetectionStrategy::Prompt,
        StrategyPreference::Auto => spec.default_strategy(),
    }
}

/// Wrap `command` so it prints the open marker, runs, then prints the close
/// marker and its exit status, even when it fails or is empty
pub fn command_with_delimiter_sandwich(
    spec: &ShellSpecification,
    detector: &BoundaryDetector,
    command: &str,
) -> String {
    spec.command_wrap(command, detector)
}

/// Rewrite the prompt to carry the close marker, print the open marker and
/// run `command`; the shell's next prompt ends the command.
///
/// `None` when the shell has no prompt hook.
pub fn command_with_prompt(
    spec: &ShellSpecification,
    detector: &BoundaryDetector,
    command: &str,
) -> Option<String> {
    let prompt = spec.prompt_command(detector)?;
    let dialect = spec.dialect();
    let open = dialect.print_open(detector);
    let run = dialect.evaluate(command);
    let line = match dialect {
        Dialect::PowerShell => format!(
            "{}; {}; $global:LASTEXITCODE = 0; {}{}",
            prompt,
            open,
            run,
            dialect.line_ending()
        ),
        Dialect::Posix | Dialect::Fish => {
            format!("{}; {}; {}{}", prompt, open, run, dialect.line_ending())
        }
        Dialect::Cmd => return None,
    };
    Some(line)
}

/// Produce the line for the selected strategy, falling back to the sandwich
/// when the prompt hook is unavailable
pub fn wrap(
    spec: &ShellSpecification,
    detector: &BoundaryDetector,
    command: &str,
    strategy: DetectionStrategy,
) -> String {
    match strategy {
        DetectionStrategy::Prompt => command_with_prompt(spec, detector, command)
            .unwrap_or_else(|| command_with_delimiter_sandwich(spec, detector, command)),
        DetectionStrategy::Sandwich => command_with_delimiter_sandwich(spec, detector, command),
    }
}
