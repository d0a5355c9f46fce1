//! PTY-backed Shell Process
//!
//! Spawns a shell on a pseudoterminal with portable-pty and bridges the
//! blocking master reads/writes to async code through channels and
//! background threads.

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::sync::mpsc::{channel, Sender as StdSender};
use std::sync::Mutex;
use std::thread;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::opaque::{OpaqueProcess, ProcessEvent, SpawnRequest};
use crate::error::{Error, Result};

/// End-of-text byte; the line discipline turns it into SIGINT for the
/// foreground process group
const CTRL_C: u8 = 0x03;

/// Shell running on a local pseudoterminal
pub struct PtyProcess {
    input_tx: StdSender<Vec<u8>>,
    events: Option<UnboundedReceiver<ProcessEvent>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    pid: Option<u32>,
}

impl PtyProcess {
    /// Spawn the requested shell on a new PTY
    pub fn spawn(request: &SpawnRequest) -> Result<Self> {
        let (program, args) = request.command_line();
        let spawn_failed = |reason: String| Error::SpawnFailed {
            command: program.clone(),
            reason,
        };

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: request.size.0,
                cols: request.size.1,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| spawn_failed(format!("failed to open PTY: {}", e)))?;

        let mut cmd_builder = CommandBuilder::new(&program);
        cmd_builder.args(&args);
        if !request.inherit_env {
            cmd_builder.env_clear();
        }
        for (key, value) in &request.environment {
            cmd_builder.env(key, value);
        }
        if let Some(dir) = &request.working_directory {
            cmd_builder.cwd(dir);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd_builder)
            .map_err(|e| spawn_failed(e.to_string()))?;
        // The master only sees EOF once every slave handle is closed
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();

        let mut master_reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| spawn_failed(format!("failed to clone PTY reader: {}", e)))?;
        let master_writer = pair
            .master
            .take_writer()
            .map_err(|e| spawn_failed(format!("failed to take PTY writer: {}", e)))?;

        let (events_tx, events_rx) = unbounded_channel::<ProcessEvent>();
        let (input_tx, input_rx) = channel::<Vec<u8>>();

        let reader_tx = events_tx.clone();
        thread::spawn(move || read_loop(&mut *master_reader, reader_tx));
        thread::spawn(move || write_loop(master_writer, input_rx));

        let waiter_tx: UnboundedSender<ProcessEvent> = events_tx;
        thread::spawn(move || {
            let code = match child.wait() {
                Ok(status) if status.signal().is_some() => None,
                Ok(status) => Some(status.exit_code() as i32),
                Err(e) => {
                    warn!("PTY wait failed: {}", e);
                    None
                }
            };
            debug!("PTY child exited with {:?}", code);
            let _ = waiter_tx.send(ProcessEvent::Exited(code));
        });

        info!("Spawned PTY shell '{}' (pid {:?})", program, pid);
        Ok(Self {
            input_tx,
            events: Some(events_rx),
            killer: Mutex::new(killer),
            master: Mutex::new(pair.master),
            pid,
        })
    }

    /// Resize the pseudoterminal
    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        let master = self.master.lock().map_err(|_| Error::ProcessWriteFailed {
            reason: "PTY master lock poisoned".to_string(),
        })?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::ProcessWriteFailed {
                reason: format!("resize failed: {}", e),
            })
    }
}

#[async_trait::async_trait]
impl OpaqueProcess for PtyProcess {
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
        self.write(&[CTRL_C]).await
    }

    async fn terminate(&self) -> Result<()> {
        let mut killer = self.killer.lock().map_err(|_| Error::SignalSendFailed {
            signal: "SIGKILL".to_string(),
            reason: "killer lock poisoned".to_string(),
        })?;
        killer.kill().map_err(|e| Error::SignalSendFailed {
            signal: "SIGKILL".to_string(),
            reason: e.to_string(),
        })
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn uses_pty(&self) -> bool {
        true
    }
}

fn read_loop(reader: &mut (dyn Read + Send), tx: UnboundedSender<ProcessEvent>) {
    let mut buf = [0u8; 4096];
    let mut consecutive_errors = 0;
    const MAX_CONSECUTIVE_ERRORS: u32 = 5;

    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("PTY read EOF");
                break;
            }
            Ok(n) => {
                consecutive_errors = 0;
                if tx.send(ProcessEvent::Output(buf[..n].to_vec())).is_err() {
                    debug!("PTY read: receiver dropped, stopping reader thread");
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(10));
            }
            Err(e) if is_pty_closed(&e) => {
                debug!("PTY closed by child exit");
                break;
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!(
                    "PTY read error ({}): {} (attempt {}/{})",
                    e.kind(),
                    e,
                    consecutive_errors,
                    MAX_CONSECUTIVE_ERRORS
                );
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    error!("PTY read: too many consecutive errors, stopping reader thread");
                    break;
                }
                thread::sleep(std::time::Duration::from_millis(50));
            }
        }
    }
}

fn write_loop(mut writer: Box<dyn Write + Send>, rx: std::sync::mpsc::Receiver<Vec<u8>>) {
    while let Ok(data) = rx.recv() {
        loop {
            match writer.write_all(&data) {
                Ok(()) => {
                    if let Err(e) = writer.flush() {
                        debug!("PTY flush error: {}", e);
                    }
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("PTY write error ({}): {}, stopping writer thread", e.kind(), e);
                    return;
                }
            }
        }
    }
    debug!("PTY writer thread exiting");
}

/// Reading a PTY master whose slave side is gone fails with EIO on Linux
#[cfg(unix)]
fn is_pty_closed(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(nix::errno::Errno::EIO as i32)
}

#[cfg(not(unix))]
fn is_pty_closed(_e: &std::io::Error) -> bool {
    false
}
