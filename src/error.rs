//! Error types and Result aliases for the session engine

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the session engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // === Shell errors ===
    /// Requested dialect has no shell specification
    #[error("Unsupported shell kind '{kind}'")]
    UnsupportedShellKind { kind: String },

    // === Process errors ===
    /// Underlying process or connection could not start
    #[error("Failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    /// Failed to hand bytes to the process input
    #[error("Failed to write to process: {reason}")]
    ProcessWriteFailed { reason: String },

    /// The session's shell process is no longer running
    #[error("Shell process for session '{session_id}' has exited")]
    ProcessExited { session_id: String },

    /// Failed to send signal to process
    #[error("Failed to send signal '{signal}': {reason}")]
    SignalSendFailed { signal: String, reason: String },

    /// Signal handling not supported for this process
    #[error("Signal '{signal}' not supported on {platform}")]
    SignalNotSupported { signal: String, platform: String },

    // === Session errors ===
    /// Stale or unknown session identifier
    #[error("Session '{session_id}' not found")]
    SessionNotFound { session_id: String },

    /// A command is already in flight on the session
    #[error("Session '{session_id}' already has a command in flight")]
    SessionBusy { session_id: String },

    /// The session driver stopped before answering
    #[error("Session '{session_id}' is closed")]
    SessionClosed { session_id: String },

    // === Boundary detection (recovered, reported as events) ===
    /// Close marker never observed within the bounded wait
    #[error("Close marker not observed for command '{command}' within {waited:?}")]
    BoundaryDetectionTimeout { command: String, waited: Duration },

    /// Close marker found but the trailing status token is unparsable
    #[error("Malformed exit status token '{token}'")]
    MalformedExitStatus { token: String },

    // === Path errors ===
    /// Path is not present in the flattened tree
    #[error("Path '{path}' not found in tree")]
    PathNotFound { path: String },

    // === Configuration errors ===
    /// Failed to load configuration file
    #[error("Failed to load config from '{}': {reason}", path.display())]
    ConfigLoadFailed { path: PathBuf, reason: String },

    /// Failed to parse configuration
    #[error("Failed to parse {format} config: {reason}")]
    ConfigParseFailed { format: String, reason: String },

    /// Failed to serialize configuration
    #[error("Failed to serialize config as {format}: {reason}")]
    ConfigSerializationFailed { format: String, reason: String },

    /// Configuration validation failed
    #[error("Configuration validation failed for '{field}': {reason}")]
    ConfigValidationFailed { field: String, reason: String },

    // === I/O ===
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error is a recovered protocol anomaly rather than a failed operation
    pub fn is_recovered(&self) -> bool {
        matches!(
            self,
            Error::BoundaryDetectionTimeout { .. } | Error::MalformedExitStatus { .. }
        )
    }
}
