//! Process Signals
//!
//! Signal delivery for locally spawned shells.

use crate::error::{Error, Result};

/// Signals the engine sends to shell processes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Interrupt signal (Ctrl+C)
    Interrupt,
    /// Termination signal (graceful shutdown)
    Terminate,
    /// Kill signal (forceful termination)
    Kill,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Kill => "SIGKILL",
        }
    }

    #[cfg(unix)]
    fn to_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal as NixSignal;
        match self {
            Signal::Interrupt => NixSignal::SIGINT,
            Signal::Terminate => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
        }
    }
}

/// Send `signal` to a process, or to its whole process group when
/// `process_group` is set (the shell and its foreground job)
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: Signal, process_group: bool) -> Result<()> {
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    let target = Pid::from_raw(pid as i32);
    let result = if process_group {
        killpg(target, signal.to_nix())
    } else {
        kill(target, signal.to_nix())
    };
    result.map_err(|e| Error::SignalSendFailed {
        signal: signal.name().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(not(unix))]
pub fn send_signal(_pid: u32, signal: Signal, _process_group: bool) -> Result<()> {
    Err(Error::SignalNotSupported {
        signal: signal.name().to_string(),
        platform: std::env::consts::OS.to_string(),
    })
}
