//! Per-session driver task
//!
//! One tokio task per session owns the [`ProcessMaster`] and the pending
//! command. Registry calls arrive over a control channel; process output is
//! fed to the pending command's parser in arrival order. Timeouts and the
//! post-exit drain window are deadlines of the same loop, so every accepted
//! command reaches exactly one completion.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, UnboundedReceiver};
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::events::{SessionEvent, SessionEventBus};
use super::ids::{ProcessId, SessionId};
use crate::boundary::{
    select_strategy, wrap, BoundaryDetector, CommandOutcome, Completion, ParseEvent,
    ParserOptions, StrategyPreference, StreamParser,
};
use crate::error::{Error, Result};
use crate::models::ShellType;
use crate::process::{ProcessEvent, ProcessMaster};
use crate::shell::{DetectionStrategy, ShellSpecification};

/// Requests sent from the registry to a driver
pub(crate) enum Control {
    Run {
        command: String,
        completion: Option<oneshot::Sender<CommandOutcome>>,
        reply: oneshot::Sender<Result<()>>,
    },
    Cancel {
        reply: oneshot::Sender<bool>,
    },
    Info {
        reply: oneshot::Sender<SessionInfo>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Detection settings for one session
#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    pub strategy: StrategyPreference,
    pub parser: ParserOptions,
    pub command_timeout: Option<Duration>,
    pub exit_grace: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            strategy: StrategyPreference::Auto,
            parser: ParserOptions::default(),
            command_timeout: None,
            exit_grace: Duration::from_millis(250),
        }
    }
}

/// Snapshot of a session's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub process_id: ProcessId,
    pub shell_type: ShellType,
    pub program: String,
    pub pid: Option<u32>,
    pub uses_pty: bool,
    pub strategy: DetectionStrategy,
    /// A command is in flight
    pub busy: bool,
    /// The shell process is still alive
    pub running: bool,
    pub exit_code: Option<i32>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub commands_run: u64,
}

struct PendingCommand {
    command: String,
    parser: StreamParser,
    completion: Option<oneshot::Sender<CommandOutcome>>,
    deadline: Option<Instant>,
}

/// What woke the driver loop
enum Wake {
    Control(Option<Control>),
    Process(Option<ProcessEvent>),
    Deadline,
}

pub(crate) struct SessionDriver {
    session_id: SessionId,
    spec: ShellSpecification,
    master: ProcessMaster,
    events: Option<UnboundedReceiver<ProcessEvent>>,
    bus: SessionEventBus,
    options: DriverOptions,
    pending: Option<PendingCommand>,
    /// Set once the process reported exit
    exited: bool,
    exit_published: bool,
    /// End of the post-exit drain window
    exit_deadline: Option<Instant>,
    commands_run: u64,
}

impl SessionDriver {
    pub(crate) fn new(
        session_id: SessionId,
        spec: ShellSpecification,
        mut master: ProcessMaster,
        bus: SessionEventBus,
        options: DriverOptions,
    ) -> Self {
        let events = master.subscribe();
        Self {
            session_id,
            spec,
            master,
            events,
            bus,
            options,
            pending: None,
            exited: false,
            exit_published: false,
            exit_deadline: None,
            commands_run: 0,
        }
    }

    fn strategy(&self) -> DetectionStrategy {
        select_strategy(&self.spec, self.master.uses_pty(), self.options.strategy)
    }

    /// Drive the session until shutdown or until the registry goes away
    pub(crate) async fn run(mut self, mut control: Receiver<Control>) {
        debug!(session_id = %self.session_id, "Session driver started");
        loop {
            let deadline = self.next_deadline();
            let wake = tokio::select! {
                message = control.recv() => Wake::Control(message),
                event = next_event(&mut self.events) => Wake::Process(event),
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Wake::Deadline,
            };

            match wake {
                Wake::Control(Some(Control::Shutdown { reply })) => {
                    self.shutdown().await;
                    let _ = reply.send(());
                    break;
                }
                Wake::Control(Some(message)) => self.handle_control(message).await,
                Wake::Control(None) => {
                    self.shutdown().await;
                    break;
                }
                Wake::Process(Some(event)) => self.handle_process_event(event),
                Wake::Process(None) => self.handle_events_closed(),
                Wake::Deadline => self.handle_deadline(),
            }
        }
        debug!(session_id = %self.session_id, "Session driver stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        let command = self.pending.as_ref().and_then(|p| p.deadline);
        let exit = self.pending.as_ref().and(self.exit_deadline);
        match (command, exit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    async fn handle_control(&mut self, message: Control) {
        match message {
            Control::Run {
                command,
                completion,
                reply,
            } => {
                let result = self.start_command(command, completion).await;
                let _ = reply.send(result);
            }
            Control::Cancel { reply } => {
                let cancelled = self.cancel().await;
                let _ = reply.send(cancelled);
            }
            Control::Info { reply } => {
                let _ = reply.send(self.info());
            }
            // Handled by the loop
            Control::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn start_command(
        &mut self,
        command: String,
        completion: Option<oneshot::Sender<CommandOutcome>>,
    ) -> Result<()> {
        if self.pending.is_some() {
            return Err(Error::SessionBusy {
                session_id: self.session_id.to_string(),
            });
        }
        if self.exited || !self.master.is_running() {
            return Err(Error::ProcessExited {
                session_id: self.session_id.to_string(),
            });
        }

        let use_pty = self.master.uses_pty();
        let detector = BoundaryDetector::default_random(use_pty);
        let strategy = self.strategy();
        let line = wrap(&self.spec, &detector, &command, strategy);

        self.master.write(line.as_bytes()).await?;

        self.commands_run += 1;
        info!(
            session_id = %self.session_id,
            ?strategy,
            "Accepted command: {}", command
        );
        self.pending = Some(PendingCommand {
            command,
            parser: StreamParser::new(&detector, self.options.parser),
            completion,
            deadline: self.options.command_timeout.map(|t| Instant::now() + t),
        });
        Ok(())
    }

    /// Complete the pending command as cancelled; false when idle
    async fn cancel(&mut self) -> bool {
        if self.pending.is_none() {
            debug!(session_id = %self.session_id, "Cancel with no pending command");
            return false;
        }
        if let Err(e) = self.master.interrupt().await {
            warn!(session_id = %self.session_id, "Interrupt failed: {}", e);
        }
        info!(session_id = %self.session_id, "Command cancelled");
        self.force_complete(Completion::Cancelled);
        true
    }

    fn handle_process_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Output(bytes) => {
                let Some(pending) = self.pending.as_mut() else {
                    trace!(
                        session_id = %self.session_id,
                        "Discarding {} bytes with no pending command",
                        bytes.len()
                    );
                    return;
                };
                let events = pending.parser.feed(&bytes);
                self.dispatch(events);
            }
            ProcessEvent::Exited(code) => {
                info!(session_id = %self.session_id, "Shell exited with {:?}", code);
                self.master.mark_exited(code);
                self.exited = true;
                if self.pending.is_some() {
                    // Output read on another thread may still be in flight
                    self.exit_deadline = Some(Instant::now() + self.options.exit_grace);
                } else {
                    self.publish_exit();
                }
            }
        }
    }

    fn handle_events_closed(&mut self) {
        debug!(session_id = %self.session_id, "Process event stream closed");
        self.events = None;
        if !self.exited {
            self.master.mark_exited(None);
            self.exited = true;
        }
        if self.pending.is_some() {
            self.force_complete(Completion::ProcessExited);
        } else {
            self.publish_exit();
        }
    }

    fn handle_deadline(&mut self) {
        let now = Instant::now();
        if matches!(self.exit_deadline, Some(d) if d <= now) && self.pending.is_some() {
            self.force_complete(Completion::ProcessExited);
            return;
        }
        let timed_out = self
            .pending
            .as_ref()
            .and_then(|p| p.deadline)
            .is_some_and(|d| d <= now);
        if timed_out {
            if let Some(pending) = &self.pending {
                let error = Error::BoundaryDetectionTimeout {
                    command: pending.command.clone(),
                    waited: self.options.command_timeout.unwrap_or_default(),
                };
                warn!(session_id = %self.session_id, "{}", error);
                self.bus.publish(SessionEvent::Error {
                    detail: error.to_string(),
                });
            }
            self.force_complete(Completion::TimedOut);
        }
    }

    fn force_complete(&mut self, completion: Completion) {
        let exit_code = self.master.exit_code();
        if let Some(pending) = self.pending.as_mut() {
            let events = pending.parser.finish(completion, exit_code);
            self.dispatch(events);
        }
    }

    /// Publish parser events, retiring the pending command on completion
    fn dispatch(&mut self, events: Vec<ParseEvent>) {
        for event in events {
            match event {
                ParseEvent::Partial(text) => {
                    self.bus.publish(SessionEvent::Partial { text });
                }
                ParseEvent::Complete(outcome) => {
                    if let Some(mut pending) = self.pending.take() {
                        if let Some(error) = pending.parser.take_anomaly() {
                            warn!(session_id = %self.session_id, "{}", error);
                            self.bus.publish(SessionEvent::Error {
                                detail: error.to_string(),
                            });
                        }
                        debug!(
                            session_id = %self.session_id,
                            completion = ?outcome.completion,
                            exit_status = ?outcome.exit_status,
                            "Command complete"
                        );
                        if let Some(completion) = pending.completion.take() {
                            let _ = completion.send(outcome.clone());
                        }
                    }
                    self.bus.publish(SessionEvent::Complete(outcome));
                    self.exit_deadline = None;
                    if self.exited {
                        self.publish_exit();
                    }
                }
            }
        }
    }

    fn publish_exit(&mut self) {
        if !self.exit_published {
            self.exit_published = true;
            self.bus.publish(SessionEvent::Exited {
                code: self.master.exit_code(),
            });
        }
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.master.terminate().await {
            warn!(session_id = %self.session_id, "Failed to terminate shell: {}", e);
        }
        if self.pending.is_some() {
            self.force_complete(Completion::Cancelled);
        }
        info!(session_id = %self.session_id, "Session shut down");
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            process_id: self.master.id().clone(),
            shell_type: self.spec.shell_type(),
            program: self.master.shell_command().to_string(),
            pid: self.master.pid(),
            uses_pty: self.master.uses_pty(),
            strategy: self.strategy(),
            busy: self.pending.is_some(),
            running: !self.exited,
            exit_code: self.master.exit_code(),
            started_at: self.master.started_at(),
            commands_run: self.commands_run,
        }
    }
}

async fn next_event(events: &mut Option<UnboundedReceiver<ProcessEvent>>) -> Option<ProcessEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
