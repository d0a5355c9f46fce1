//! Session Registry
//!
//! Creates sessions, routes commands to their drivers and enforces the
//! one-command-in-flight rule. The registry owns identifier allocation; ids
//! of destroyed sessions are never issued again.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

use super::driver::{Control, DriverOptions, SessionDriver, SessionInfo};
use super::events::{SessionEventBus, SessionSubscription};
use super::ids::{ChatId, IdAllocator, SessionId};
use crate::boundary::CommandOutcome;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::process::{LocalSpawner, ProcessMaster, ProcessSpawner, SpawnRequest};

/// Control messages buffered per session
const CONTROL_CAPACITY: usize = 32;

/// Spawn settings for a new session; unset values come from the config
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub use_pty: Option<bool>,
    pub working_directory: Option<PathBuf>,
    pub environment: HashMap<String, String>,
}

/// Where a session's shell runs
#[derive(Clone)]
pub enum ConnectionTarget {
    /// Shell spawned on this machine
    Local(SpawnOptions),
    /// Shell reached through a caller-supplied transport
    External {
        spawner: Arc<dyn ProcessSpawner>,
        options: SpawnOptions,
    },
}

impl ConnectionTarget {
    /// Local shell with configured defaults
    pub fn local() -> Self {
        ConnectionTarget::Local(SpawnOptions::default())
    }

    /// Local shell on a PTY
    pub fn pty() -> Self {
        ConnectionTarget::Local(SpawnOptions {
            use_pty: Some(true),
            ..Default::default()
        })
    }

    /// Local shell on pipes
    pub fn pipe() -> Self {
        ConnectionTarget::Local(SpawnOptions {
            use_pty: Some(false),
            ..Default::default()
        })
    }

    pub fn external(spawner: Arc<dyn ProcessSpawner>) -> Self {
        ConnectionTarget::External {
            spawner,
            options: SpawnOptions::default(),
        }
    }

    fn options(&self) -> &SpawnOptions {
        match self {
            ConnectionTarget::Local(options) => options,
            ConnectionTarget::External { options, .. } => options,
        }
    }
}

impl Default for ConnectionTarget {
    fn default() -> Self {
        Self::local()
    }
}

impl std::fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionTarget::Local(options) => f.debug_tuple("Local").field(options).finish(),
            ConnectionTarget::External { options, .. } => {
                f.debug_struct("External").field("options", options).finish()
            }
        }
    }
}

struct SessionHandle {
    control: mpsc::Sender<Control>,
    bus: SessionEventBus,
    task: JoinHandle<()>,
}

/// Live sessions and the id space they are drawn from
pub struct SessionRegistry {
    config: EngineConfig,
    ids: Mutex<IdAllocator>,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_allocator(config, IdAllocator::new())
    }

    /// Registry drawing ids from a custom allocator
    pub fn with_allocator(config: EngineConfig, ids: IdAllocator) -> Self {
        Self {
            config,
            ids: Mutex::new(ids),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn with_ids<T>(&self, f: impl FnOnce(&mut IdAllocator) -> T) -> T {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut ids)
    }

    /// Spawn a shell and register a session for it
    pub async fn create_session(
        &self,
        shell_kind: &str,
        target: ConnectionTarget,
    ) -> Result<SessionId> {
        let spec = self.config.shell_spec(shell_kind)?;
        let session_config = &self.config.session;
        let options = target.options();

        let mut request =
            SpawnRequest::new(spec.clone(), options.use_pty.unwrap_or(session_config.use_pty));
        request.working_directory = options
            .working_directory
            .clone()
            .or_else(|| session_config.working_directory.clone());
        request.environment = session_config.environment.clone();
        request.environment.extend(options.environment.clone());
        request.inherit_env = session_config.inherit_env;
        request.size = (session_config.pty_rows, session_config.pty_cols);

        let process = match &target {
            ConnectionTarget::Local(_) => LocalSpawner.spawn(&request).await,
            ConnectionTarget::External { spawner, .. } => spawner.spawn(&request).await,
        }
        .map_err(|e| {
            error!("Failed to spawn {} session: {}", spec.shell_type(), e);
            e
        })?;

        let (session_id, process_id) = self.with_ids(|ids| (ids.session_id(), ids.process_id()));
        let (program, args) = request.command_line();
        let master = ProcessMaster::new(process_id, process, program, args);

        let bus = SessionEventBus::new(session_id.clone(), session_config.event_capacity);
        let options = DriverOptions {
            strategy: self.config.detection.strategy,
            parser: self.config.detection.parser_options(),
            command_timeout: self.config.detection.command_timeout(),
            exit_grace: self.config.detection.exit_grace(),
        };
        let driver = SessionDriver::new(session_id.clone(), spec, master, bus.clone(), options);
        let (control, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let task = tokio::spawn(driver.run(control_rx));

        self.sessions
            .write()
            .await
            .insert(session_id.clone(), SessionHandle { control, bus, task });
        info!(session_id = %session_id, "Created {} session", shell_kind);
        Ok(session_id)
    }

    async fn control(&self, session_id: &SessionId) -> Result<mpsc::Sender<Control>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|handle| handle.control.clone())
            .ok_or_else(|| Error::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    async fn request<T>(
        &self,
        session_id: &SessionId,
        message: impl FnOnce(oneshot::Sender<T>) -> Control,
    ) -> Result<T> {
        let control = self.control(session_id).await?;
        let (reply, response) = oneshot::channel();
        let closed = || Error::SessionClosed {
            session_id: session_id.to_string(),
        };
        control.send(message(reply)).await.map_err(|_| closed())?;
        response.await.map_err(|_| closed())
    }

    /// Send a command; resolves once the command is accepted
    pub async fn run_command(&self, session_id: &SessionId, command: &str) -> Result<()> {
        self.request(session_id, |reply| Control::Run {
            command: command.to_string(),
            completion: None,
            reply,
        })
        .await?
    }

    /// Send a command and wait for its outcome
    pub async fn execute(&self, session_id: &SessionId, command: &str) -> Result<CommandOutcome> {
        let (completion, outcome) = oneshot::channel();
        self.request(session_id, |reply| Control::Run {
            command: command.to_string(),
            completion: Some(completion),
            reply,
        })
        .await??;
        outcome.await.map_err(|_| Error::SessionClosed {
            session_id: session_id.to_string(),
        })
    }

    /// Event stream of one session
    pub async fn subscribe(&self, session_id: &SessionId) -> Result<SessionSubscription> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|handle| handle.bus.subscribe())
            .ok_or_else(|| Error::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Interrupt the in-flight command; no-op when the session is idle
    pub async fn cancel(&self, session_id: &SessionId) -> Result<()> {
        self.request(session_id, |reply| Control::Cancel { reply })
            .await
            .map(|_| ())
    }

    /// Terminate the shell and forget the session
    pub async fn destroy_session(&self, session_id: &SessionId) -> Result<()> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| Error::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        Self::stop(session_id, handle).await;
        info!(session_id = %session_id, "Destroyed session");
        Ok(())
    }

    async fn stop(session_id: &SessionId, handle: SessionHandle) {
        let (reply, done) = oneshot::channel();
        if handle.control.send(Control::Shutdown { reply }).await.is_ok() {
            let _ = done.await;
        }
        if let Err(e) = handle.task.await {
            warn!(session_id = %session_id, "Session driver task failed: {}", e);
        }
    }

    pub async fn session_info(&self, session_id: &SessionId) -> Result<SessionInfo> {
        self.request(session_id, |reply| Control::Info { reply }).await
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Fresh chat thread identifier
    pub fn new_chat_id(&self) -> ChatId {
        self.with_ids(|ids| ids.chat_id())
    }

    /// Destroy every session
    pub async fn shutdown(&self) {
        let handles: Vec<(SessionId, SessionHandle)> =
            self.sessions.write().await.drain().collect();
        info!("Shutting down {} sessions", handles.len());
        futures::future::join_all(
            handles
                .into_iter()
                .map(|(id, handle)| async move { Self::stop(&id, handle).await }),
        )
        .await;
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
