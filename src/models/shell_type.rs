//! Shell Type Definitions
//!
//! Canonical list of the shells the engine knows how to drive, and the
//! dialect family each of them belongs to.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Concrete shell being driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShellType {
    /// Bourne Again Shell
    #[default]
    Bash,
    /// Z Shell
    Zsh,
    /// POSIX sh
    Sh,
    /// Dash
    Dash,
    /// Korn Shell
    Ksh,
    /// Fish Shell
    Fish,
    /// PowerShell (Windows PowerShell or pwsh)
    PowerShell,
    /// Command Prompt
    Cmd,
}

/// Syntax family shared by several shells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// bash/zsh/sh family
    Posix,
    /// fish
    Fish,
    /// PowerShell
    PowerShell,
    /// Windows cmd.exe
    Cmd,
}

impl ShellType {
    /// Every supported shell, in table order
    pub const ALL: [ShellType; 8] = [
        ShellType::Bash,
        ShellType::Zsh,
        ShellType::Sh,
        ShellType::Dash,
        ShellType::Ksh,
        ShellType::Fish,
        ShellType::PowerShell,
        ShellType::Cmd,
    ];

    /// Get a string representation of the shell type
    pub fn as_str(&self) -> &'static str {
        match self {
            ShellType::Bash => "bash",
            ShellType::Zsh => "zsh",
            ShellType::Sh => "sh",
            ShellType::Dash => "dash",
            ShellType::Ksh => "ksh",
            ShellType::Fish => "fish",
            ShellType::PowerShell => "powershell",
            ShellType::Cmd => "cmd",
        }
    }

    /// Parse a shell name or executable path (case-insensitive).
    ///
    /// Accepts bare names (`bash`), paths (`/usr/bin/zsh`) and Windows
    /// executables (`pwsh.exe`, `C:\Windows\System32\cmd.exe`).
    pub fn from_name(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        let base = trimmed
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(trimmed)
            .to_lowercase();
        let stem = Path::new(&base)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&base)
            .to_string();

        match stem.as_str() {
            "bash" => Ok(ShellType::Bash),
            "zsh" => Ok(ShellType::Zsh),
            "sh" => Ok(ShellType::Sh),
            "dash" => Ok(ShellType::Dash),
            "ksh" | "mksh" => Ok(ShellType::Ksh),
            "fish" => Ok(ShellType::Fish),
            "powershell" | "pwsh" => Ok(ShellType::PowerShell),
            "cmd" => Ok(ShellType::Cmd),
            _ => Err(Error::UnsupportedShellKind {
                kind: name.to_string(),
            }),
        }
    }

    /// Dialect family used for wrapping and escaping
    pub fn dialect(&self) -> Dialect {
        match self {
            ShellType::Bash
            | ShellType::Zsh
            | ShellType::Sh
            | ShellType::Dash
            | ShellType::Ksh => Dialect::Posix,
            ShellType::Fish => Dialect::Fish,
            ShellType::PowerShell => Dialect::PowerShell,
            ShellType::Cmd => Dialect::Cmd,
        }
    }
}

impl std::fmt::Display for ShellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShellType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}
