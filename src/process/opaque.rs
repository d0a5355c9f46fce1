//! Opaque Process Interface
//!
//! The only view of a shell process the engine needs: a byte sink, a single
//! ordered stream of output and exit events, and best-effort control. Local
//! PTYs, local pipes and remote transports all hide behind it.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::Result;
use crate::shell::ShellSpecification;

/// Event delivered by a running process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Raw output bytes, in the order the process produced them
    Output(Vec<u8>),
    /// The process exited; `None` when killed by a signal or unknown
    Exited(Option<i32>),
}

/// Duplex byte endpoint for one shell process.
///
/// The event stream closing means no more output will arrive. An `Exited`
/// event may precede the final output chunks when output is read on a
/// separate thread from the exit wait.
#[async_trait::async_trait]
pub trait OpaqueProcess: Send + Sync {
    /// Queue bytes for the process input
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Take the event stream; only the first call returns it
    fn subscribe(&mut self) -> Option<UnboundedReceiver<ProcessEvent>>;

    /// Interrupt the foreground command (Ctrl+C equivalent)
    async fn interrupt(&self) -> Result<()>;

    /// Terminate the process
    async fn terminate(&self) -> Result<()>;

    /// OS process identifier, when local
    fn pid(&self) -> Option<u32> {
        None
    }

    /// Whether input is echoed through a pseudoterminal
    fn uses_pty(&self) -> bool;
}

/// Everything needed to start a shell
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub spec: ShellSpecification,
    pub use_pty: bool,
    pub working_directory: Option<PathBuf>,
    pub environment: HashMap<String, String>,
    pub inherit_env: bool,
    /// Terminal size as (rows, cols)
    pub size: (u16, u16),
}

impl SpawnRequest {
    pub fn new(spec: ShellSpecification, use_pty: bool) -> Self {
        Self {
            spec,
            use_pty,
            working_directory: None,
            environment: HashMap::new(),
            inherit_env: true,
            size: (24, 80),
        }
    }

    /// Program and arguments the request resolves to
    pub fn command_line(&self) -> (String, Vec<String>) {
        (self.spec.program().to_string(), self.spec.args(self.use_pty))
    }

    /// Effective environment: optionally inherited, then overridden
    pub fn effective_environment(&self) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = if self.inherit_env {
            std::env::vars().collect()
        } else {
            HashMap::new()
        };
        for (key, value) in &self.environment {
            env.insert(key.clone(), value.clone());
        }
        env
    }
}

/// Connection layer: turns a request into a running process
#[async_trait::async_trait]
pub trait ProcessSpawner: Send + Sync {
    async fn spawn(&self, request: &SpawnRequest) -> Result<Box<dyn OpaqueProcess>>;
}
