//! Shell process layer
//!
//! Everything the engine knows about a running shell goes through
//! [`OpaqueProcess`]. Local shells run on a PTY ([`PtyProcess`]) or on
//! plain pipes ([`PipeProcess`]); other transports plug in through
//! [`ProcessSpawner`].

pub mod master;
pub mod opaque;
pub mod pipe;
pub mod pty;
pub mod signals;

pub use master::{ProcessMaster, ProcessState};
pub use opaque::{OpaqueProcess, ProcessEvent, ProcessSpawner, SpawnRequest};
pub use pipe::PipeProcess;
pub use pty::PtyProcess;
pub use signals::{send_signal, Signal};

use crate::error::Result;

/// Spawns shells on the local machine
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSpawner;

#[async_trait::async_trait]
impl ProcessSpawner for LocalSpawner {
    async fn spawn(&self, request: &SpawnRequest) -> Result<Box<dyn OpaqueProcess>> {
        debug!(
            "Spawning local {} shell '{}'",
            if request.use_pty { "PTY" } else { "pipe" },
            request.spec.program()
        );
        if request.use_pty {
            Ok(Box::new(PtyProcess::spawn(request)?))
        } else {
            Ok(Box::new(PipeProcess::spawn(request)?))
        }
    }
}
