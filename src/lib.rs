//! MosaicTerm Session Engine
//!
//! Drives interactive shells as request/response channels. Every command is
//! sent wrapped between two random marker tokens; the engine finds those
//! markers again in the raw output stream to recover where the command's
//! output starts, where it ends and its exit status.
//!
//! ## Features
//!
//! - **Dialects:** bash, zsh, sh, dash, ksh, fish, PowerShell and cmd
//! - **Transports:** local PTY via `portable-pty`, local pipes via
//!   `tokio::process`, or any caller-supplied [`process::OpaqueProcess`]
//! - **Streaming:** partial output pushed to subscribers while a command runs
//! - **Recovery:** timeouts, process exit and cancellation always complete
//!   the pending command
//!
//! ## Module Organization
//!
//! - [`shell`] - Per-shell specifications and dialect quoting rules
//! - [`boundary`] - Marker tokens, command wrapping and the stream parser
//! - [`process`] - Process abstraction, PTY and pipe implementations
//! - [`session`] - Session registry, per-session driver and events
//! - [`path`] - Host-independent path handling and the flattened file tree
//! - [`config`] - Configuration loading and validation
//! - [`models`] - Shell types and dialects
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use mosaicterm_session::{ConnectionTarget, EngineConfig, SessionRegistry};
//!
//! # async fn run() -> mosaicterm_session::Result<()> {
//! let registry = SessionRegistry::new(EngineConfig::default());
//! let session = registry.create_session("bash", ConnectionTarget::local()).await?;
//!
//! let outcome = registry.execute(&session, "echo hi").await?;
//! assert_eq!(outcome.output, "hi\n");
//! assert_eq!(outcome.exit_status, Some(0));
//!
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Driver Tasks:** one tokio task per session owns the shell process and
//!   the pending command
//! - **PTY Reader/Writer Threads:** blocking PTY I/O bridged to tokio channels
//! - **Event Buses:** per-session broadcast channels carry partial output,
//!   completions, errors and exit notifications

#![allow(unexpected_cfgs)]

#[macro_use]
extern crate tracing;

pub mod boundary;
pub mod config;
pub mod error;
pub mod models;
pub mod path;
pub mod process;
pub mod session;
pub mod shell;

// Re-exports for core functionality
pub use boundary::{BoundaryDetector, CommandOutcome, Completion, StreamParser};
pub use config::{ConfigLoader, EngineConfig};
pub use error::{Error, Result};
pub use models::{Dialect, ShellType};
pub use path::{FlatPathNode, FlattenedPathTree, PathKind};
pub use process::{OpaqueProcess, ProcessEvent, ProcessSpawner};
pub use session::{
    ConnectionTarget, SessionEvent, SessionId, SessionRegistry, SessionSubscription,
};
pub use shell::{DetectionStrategy, ShellSpecification};

/// The current version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The package name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Environment variable that turns on debug logging
pub const DEBUG_ENV_VAR: &str = "MOSAICTERM_SESSION_DEBUG";

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `debug` when `debug` is
/// true or `MOSAICTERM_SESSION_DEBUG` is `1`/`true`, and `info` otherwise.
/// Calling it more than once is harmless.
pub fn init_logging(debug: bool) {
    let env_debug = std::env::var(DEBUG_ENV_VAR)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let level = if debug || env_debug { "debug" } else { "info" };

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
