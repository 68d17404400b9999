// src/registry/process.rs

//! The OS-facing side of a supervised worker.

use std::io;
use std::process::ExitStatus;

use tokio::process::Child;

use crate::exec::{OutputTail, signal};

/// How a process ended, as observed by a non-blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Code(i32),
    Signal(i32),
    Unknown,
}

impl From<ExitStatus> for WaitOutcome {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return WaitOutcome::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return WaitOutcome::Signal(sig);
            }
        }
        WaitOutcome::Unknown
    }
}

/// Something the registry can poll, ask to stop, and force to stop.
///
/// None of these methods block.
pub trait WorkerProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// `Ok(None)` while the process is still alive.
    fn try_wait(&mut self) -> io::Result<Option<WaitOutcome>>;

    /// Graceful stop request (`SIGTERM`).
    fn terminate(&mut self) -> io::Result<()>;

    /// Forced stop (`SIGKILL`).
    fn kill(&mut self) -> io::Result<()>;

    /// Recent output, if this process's streams were captured.
    fn captured_output(&self) -> Option<String>;
}

/// A child process of the supervisor: a worker, a terminal emulator, or an
/// `ssh` session.
#[derive(Debug)]
pub struct LocalProcess {
    child: Child,
    pid: Option<u32>,
    tail: Option<OutputTail>,
}

impl LocalProcess {
    pub fn new(child: Child, tail: Option<OutputTail>) -> Self {
        let pid = child.id();
        Self { child, pid, tail }
    }
}

impl WorkerProcess for LocalProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_wait(&mut self) -> io::Result<Option<WaitOutcome>> {
        Ok(self.child.try_wait()?.map(WaitOutcome::from))
    }

    fn terminate(&mut self) -> io::Result<()> {
        // Once reaped, the pid may belong to someone else.
        match self.child.id() {
            Some(pid) => signal::terminate(pid),
            None => Ok(()),
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.child.start_kill() {
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }

    fn captured_output(&self) -> Option<String> {
        self.tail
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| t.snapshot())
    }
}
