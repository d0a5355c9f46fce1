//! Dialect Formatting
//!
//! Quoting rules and marker-printing statements for each dialect family.
//! Every statement that prints a marker emits the token as two separately
//! quoted halves, so the shell joins them only when it runs the statement.

use crate::boundary::BoundaryDetector;
use crate::models::Dialect;

impl Dialect {
    /// Statement terminator used when sending a line to the shell
    pub fn line_ending(&self) -> &'static str {
        match self {
            Dialect::Posix | Dialect::Fish => "\n",
            Dialect::PowerShell | Dialect::Cmd => "\r\n",
        }
    }

    /// Line sent to a pipe-backed shell before any command.
    ///
    /// Installs a no-op SIGINT handler so an interrupt stops the foreground
    /// job but not the shell. Must stay a handler: an ignored signal would be
    /// inherited by the job too.
    pub fn pipe_init(&self) -> Option<&'static str> {
        match self {
            Dialect::Posix => Some("trap : INT\n"),
            Dialect::Fish => Some("function __mosaic_on_int --on-signal INT; end\n"),
            Dialect::PowerShell | Dialect::Cmd => None,
        }
    }

    /// Quote `text` so the shell reads it back as one literal word
    pub fn escape(&self, text: &str) -> String {
        match self {
            Dialect::Posix => format!("'{}'", text.replace('\'', r"'\''")),
            Dialect::Fish => format!(
                "'{}'",
                text.replace('\\', r"\\").replace('\'', r"\'")
            ),
            Dialect::PowerShell => {
                let mut out = String::with_capacity(text.len() + 2);
                out.push('\'');
                for c in text.chars() {
                    // PowerShell also treats the typographic single quotes as quote characters
                    if matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
                        out.push(c);
                    }
                    out.push(c);
                }
                out.push('\'');
                out
            }
            Dialect::Cmd => {
                let mut out = String::with_capacity(text.len() + 2);
                out.push('"');
                for c in text.chars() {
                    match c {
                        '"' => out.push_str("\"\""),
                        '%' => out.push_str("\"^%\""),
                        _ => out.push(c),
                    }
                }
                out.push('"');
                out
            }
        }
    }

    /// Statement printing the open token followed by a newline
    pub(crate) fn print_open(&self, detector: &BoundaryDetector) -> String {
        let (a, b) = detector.open_halves();
        match self {
            Dialect::Posix | Dialect::Fish => format!("printf '%s%s\\n' '{}' '{}'", a, b),
            Dialect::PowerShell => format!("[Console]::WriteLine('{}' + '{}')", a, b),
            Dialect::Cmd => format!("echo {}^{}", a, b),
        }
    }

    /// Evaluate `command` in the current shell as a single escaped literal.
    ///
    /// Cmd has no evaluation primitive, so the raw command is returned and the
    /// caller places it on its own line.
    pub(crate) fn evaluate(&self, command: &str) -> String {
        match self {
            Dialect::Posix | Dialect::Fish => format!("eval {}", self.escape(command)),
            Dialect::PowerShell => {
                if command.trim().is_empty() {
                    "$null".to_string()
                } else {
                    format!("Invoke-Expression {} | Out-Default", self.escape(command))
                }
            }
            Dialect::Cmd => command.to_string(),
        }
    }

    /// Build the full sandwich: open marker, command, close marker and status
    pub(crate) fn sandwich(&self, command: &str, detector: &BoundaryDetector) -> String {
        let le = self.line_ending();
        let open = self.print_open(detector);
        let (c1, c2) = detector.close_halves();
        match self {
            Dialect::Posix => format!(
                "{}; {}; printf '%s%s %s\\n' '{}' '{}' \"$?\"{}",
                open,
                self.evaluate(command),
                c1,
                c2,
                le
            ),
            Dialect::Fish => format!(
                "{}; {}; printf '%s%s %s\\n' '{}' '{}' $status{}",
                open,
                self.evaluate(command),
                c1,
                c2,
                le
            ),
            Dialect::PowerShell => format!(
                "{}; $__mosaic_status = 0; try {{ $global:LASTEXITCODE = 0; {}; \
                 if (-not $?) {{ $__mosaic_status = 1 }}; \
                 if ($global:LASTEXITCODE) {{ $__mosaic_status = $global:LASTEXITCODE }} }} \
                 catch {{ $Host.UI.WriteErrorLine($_.ToString()); $__mosaic_status = 1 }}; \
                 [Console]::WriteLine('{}' + '{}' + ' ' + $__mosaic_status){}",
                open,
                self.evaluate(command),
                c1,
                c2,
                le
            ),
            Dialect::Cmd => format!(
                "(call ) & {}{}{}{}echo {}^{} %ERRORLEVEL%{}",
                open,
                le,
                command.lines().collect::<Vec<_>>().join(le),
                le,
                c1,
                c2,
                le
            ),
        }
    }
}
