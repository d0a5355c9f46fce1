//! Pipe-backed Shell Process
//!
//! Spawns a shell with piped stdio through tokio. No echo, no prompt; stdout
//! and stderr are merged into one event stream in arrival order.

use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use super::opaque::{OpaqueProcess, ProcessEvent, SpawnRequest};
use super::signals::{send_signal, Signal};
use crate::error::{Error, Result};

/// Shell running with piped stdin/stdout/stderr
pub struct PipeProcess {
    input_tx: UnboundedSender<Vec<u8>>,
    events: Option<UnboundedReceiver<ProcessEvent>>,
    child: std::sync::Arc<Mutex<Option<Child>>>,
    pid: Option<u32>,
}

impl PipeProcess {
    /// Spawn the requested shell with piped stdio
    pub fn spawn(request: &SpawnRequest) -> Result<Self> {
        let (program, args) = request.command_line();

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !request.inherit_env {
            command.env_clear();
        }
        command.envs(&request.environment);
        if let Some(dir) = &request.working_directory {
            command.current_dir(dir);
        }
        // Own process group so an interrupt reaches the shell's foreground job too.
        // The shell itself survives through the handler installed below.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| Error::SpawnFailed {
            command: program.clone(),
            reason: e.to_string(),
        })?;
        let pid = child.id();

        let missing = |stream: &str| Error::SpawnFailed {
            command: program.clone(),
            reason: format!("{} was not captured", stream),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let (events_tx, events_rx) = unbounded_channel::<ProcessEvent>();
        let (input_tx, input_rx) = unbounded_channel::<Vec<u8>>();

        tokio::spawn(write_loop(stdin, input_rx));
        if let Some(init) = request.spec.dialect().pipe_init() {
            debug!("Installing interrupt handler in pipe shell");
            let _ = input_tx.send(init.as_bytes().to_vec());
        }
        let stdout_task = tokio::spawn(read_loop(stdout, events_tx.clone()));
        let stderr_task = tokio::spawn(read_loop(stderr, events_tx.clone()));

        let child = std::sync::Arc::new(Mutex::new(Some(child)));
        let waiter_child = child.clone();
        tokio::spawn(async move {
            // Drain both pipes first so the exit event follows all output
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            let code = match waiter_child.lock().await.as_mut() {
                Some(child) => match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!("Waiting for shell failed: {}", e);
                        None
                    }
                },
                None => None,
            };
            debug!("Pipe shell exited with {:?}", code);
            let _ = events_tx.send(ProcessEvent::Exited(code));
        });

        info!("Spawned pipe shell '{}' (pid {:?})", program, pid);
        Ok(Self {
            input_tx,
            events: Some(events_rx),
            child,
            pid,
        })
    }
}

#[async_trait::async_trait]
impl OpaqueProcess for PipeProcess {
    async fn write(&self, data: &[u8]) -> Result<()> {
        self.input_tx
            .send(data.to_vec())
            .map_err(|e| Error::ProcessWriteFailed {
                reason: e.to_string(),
            })
    }

    fn subscribe(&mut self) -> Option<UnboundedReceiver<ProcessEvent>> {
        self.events.take()
    }

    async fn interrupt(&self) -> Result<()> {
        match self.pid {
            Some(pid) => send_signal(pid, Signal::Interrupt, true),
            None => Err(Error::SignalSendFailed {
                signal: Signal::Interrupt.name().to_string(),
                reason: "process has no pid".to_string(),
            }),
        }
    }

    async fn terminate(&self) -> Result<()> {
        if let Some(pid) = self.pid {
            if send_signal(pid, Signal::Kill, true).is_ok() {
                return Ok(());
            }
        }
        // Fallback when group signalling is unavailable
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(child) = guard.as_mut() {
                child.start_kill()?;
            }
        }
        Ok(())
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn uses_pty(&self) -> bool {
        false
    }
}

async fn read_loop<R>(mut reader: R, tx: UnboundedSender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(ProcessEvent::Output(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Pipe read error ({}): {}", e.kind(), e);
                break;
            }
        }
    }
}

async fn write_loop(mut stdin: ChildStdin, mut rx: UnboundedReceiver<Vec<u8>>) {
    while let Some(data) = rx.recv().await {
        if let Err(e) = stdin.write_all(&data).await {
            warn!("Pipe write error ({}): {}, stopping writer", e.kind(), e);
            return;
        }
        if let Err(e) = stdin.flush().await {
            debug!("Pipe flush error: {}", e);
        }
    }
    debug!("Pipe writer task exiting");
}
