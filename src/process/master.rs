//! Process Master
//!
//! Binds one spawned shell process to the command line that created it and
//! tracks its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;

use super::opaque::{OpaqueProcess, ProcessEvent};
use crate::error::Result;
use crate::session::ids::ProcessId;

/// Lifecycle state of a shell process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProcessState {
    /// Process is running
    #[default]
    Running,
    /// Process has exited or was killed
    Exited,
}

/// Sole owner of one running shell process
pub struct ProcessMaster {
    id: ProcessId,
    process: Box<dyn OpaqueProcess>,
    shell_command: String,
    shell_arguments: Vec<String>,
    pid: Option<u32>,
    state: ProcessState,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
}

impl ProcessMaster {
    /// Take ownership of a successfully spawned process
    pub fn new(
        id: ProcessId,
        process: Box<dyn OpaqueProcess>,
        shell_command: String,
        shell_arguments: Vec<String>,
    ) -> Self {
        let pid = process.pid();
        Self {
            id,
            process,
            shell_command,
            shell_arguments,
            pid,
            state: ProcessState::Running,
            started_at: Utc::now(),
            ended_at: None,
            exit_code: None,
        }
    }

    pub fn id(&self) -> &ProcessId {
        &self.id
    }

    pub fn shell_command(&self) -> &str {
        &self.shell_command
    }

    pub fn shell_arguments(&self) -> &[String] {
        &self.shell_arguments
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uses_pty(&self) -> bool {
        self.process.uses_pty()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ProcessState::Running)
    }

    /// How long the process has run, or ran before exiting
    pub fn uptime(&self) -> std::time::Duration {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        end.signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Send bytes to the process input
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.process.write(data).await
    }

    /// Take the output/exit event stream
    pub fn subscribe(&mut self) -> Option<UnboundedReceiver<ProcessEvent>> {
        self.process.subscribe()
    }

    pub async fn interrupt(&self) -> Result<()> {
        self.process.interrupt().await
    }

    pub async fn terminate(&self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.process.terminate().await
    }

    /// Record process exit; later calls keep the first exit code
    pub fn mark_exited(&mut self, exit_code: Option<i32>) {
        if self.is_running() {
            self.state = ProcessState::Exited;
            self.ended_at = Some(Utc::now());
            self.exit_code = exit_code;
        }
    }

    /// Short human-readable description
    pub fn display_string(&self) -> String {
        let state = match self.state {
            ProcessState::Running => "Running",
            ProcessState::Exited => "Exited",
        };
        let pid = self.pid.map_or("N/A".to_string(), |pid| pid.to_string());
        let exit = self
            .exit_code
            .map_or(String::new(), |code| format!(" (exit: {})", code));
        format!(
            "{} {} [{}] - {}{}",
            self.shell_command,
            self.shell_arguments.join(" "),
            pid,
            state,
            exit
        )
    }
}

impl std::fmt::Debug for ProcessMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessMaster")
            .field("id", &self.id)
            .field("shell_command", &self.shell_command)
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("exit_code", &self.exit_code)
            .finish()
    }
}

impl std::fmt::Display for ProcessMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_string())
    }
}
