//! Property-based tests for marker generation, wrapping and path handling

use mosaicterm_session::boundary::command_with_delimiter_sandwich;
use mosaicterm_session::{BoundaryDetector, PathKind, ShellSpecification, ShellType};
use proptest::prelude::*;

/// Undo POSIX single quoting of one word produced by the escaper
fn posix_unquote(word: &str) -> String {
    let inner = &word[1..word.len() - 1];
    inner.replace(r"'\''", "'")
}

proptest! {
    #[test]
    fn test_posix_escape_round_trips(text in "\\PC{0,80}") {
        let spec = ShellSpecification::for_shell(ShellType::Bash);
        let escaped = spec.escape_for_shell(&text);
        prop_assert!(escaped.starts_with('\''));
        prop_assert!(escaped.ends_with('\''));
        prop_assert_eq!(posix_unquote(&escaped), text);
    }

    #[test]
    fn test_powershell_escape_doubles_quotes(text in "[a-z'\" $]{0,40}") {
        let spec = ShellSpecification::for_shell(ShellType::PowerShell);
        let escaped = spec.escape_for_shell(&text);
        let inner = &escaped[1..escaped.len() - 1];
        prop_assert_eq!(inner.replace("''", "'"), text.clone());
        prop_assert_eq!(inner.matches('\'').count(), 2 * text.matches('\'').count());
    }

    #[test]
    fn test_wrapped_line_never_contains_a_marker(
        command in "\\PC{0,60}",
        use_pty in any::<bool>(),
        shell in prop::sample::select(ShellType::ALL.to_vec()),
    ) {
        let spec = ShellSpecification::for_shell(shell);
        let detector = BoundaryDetector::default_random(use_pty);
        let line = command_with_delimiter_sandwich(&spec, &detector, &command);

        prop_assert!(!line.contains(detector.open_token()));
        prop_assert!(!line.contains(detector.close_token()));
        prop_assert!(line.ends_with(spec.line_ending()));
    }

    #[test]
    fn test_tokens_are_fresh_hex(use_pty in any::<bool>()) {
        let a = BoundaryDetector::default_random(use_pty);
        let b = BoundaryDetector::default_random(use_pty);
        let len = if use_pty { 64 } else { 32 };
        for token in [a.open_token(), a.close_token(), b.open_token(), b.close_token()] {
            prop_assert_eq!(token.len(), len);
            prop_assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        }
        prop_assert_ne!(a.open_token(), a.close_token());
        prop_assert_ne!(a.open_token(), b.open_token());
    }

    #[test]
    fn test_posix_normalize_is_idempotent(path in "/?([a-c]{1,3}|\\.|\\.\\.)(/{1,2}([a-c]{1,3}|\\.|\\.\\.)){0,6}/?") {
        let kind = PathKind::Posix;
        let once = kind.normalize(&path);
        prop_assert_eq!(kind.normalize(&once), once.clone());
        prop_assert!(!once.contains("//"));
        prop_assert_eq!(kind.is_absolute(&once), path.starts_with('/'));
    }

    #[test]
    fn test_win32_normalize_is_idempotent(
        prefix in "(C:|C:\\\\|\\\\)?",
        body in "([a-c]{1,3}|\\.|\\.\\.)([\\\\/]([a-c]{1,3}|\\.|\\.\\.)){0,6}",
    ) {
        let kind = PathKind::Win32;
        let path = format!("{}{}", prefix, body);
        let once = kind.normalize(&path);
        prop_assert_eq!(kind.normalize(&once), once.clone());
        prop_assert!(!once.contains('/'));
    }

    #[test]
    fn test_split_rejoins_to_normalized_path(path in "/?[a-c]{1,3}(/[a-c]{1,3}|/\\.\\.|/\\.){0,6}") {
        let kind = PathKind::Posix;
        let normalized = kind.normalize(&path);
        prop_assume!(normalized != ".");

        let parts = kind.split(&path);
        let rejoined = match parts.split_first() {
            Some((root, rest)) if root == "/" => format!("/{}", rest.join("/")),
            _ => parts.join("/"),
        };
        prop_assert_eq!(rejoined, normalized);
    }

    #[test]
    fn test_join_then_parent(base in "/[a-c]{1,3}(/[a-c]{1,3}){0,4}", child in "[a-c]{1,3}") {
        let kind = PathKind::Posix;
        let joined = kind.join(&base, &child);
        prop_assert_eq!(kind.parent(&joined), Some(base.clone()));
        prop_assert_eq!(kind.file_name(&joined), Some(child));
    }
}
