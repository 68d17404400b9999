// src/exec/signal.rs

//! Signals sent to processes identified only by pid.

use std::io;

/// Ask a process to exit (`SIGTERM`).
pub fn terminate(pid: u32) -> io::Result<()> {
    send(pid, Sig::Term)
}

/// Force a process to exit (`SIGKILL`).
pub fn kill(pid: u32) -> io::Result<()> {
    send(pid, Sig::Kill)
}

enum Sig {
    Term,
    Kill,
}

#[cfg(unix)]
fn send(pid: u32, sig: Sig) -> io::Result<()> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("pid {pid} out of range")))?;
    let signal = match sig {
        Sig::Term => Signal::SIGTERM,
        Sig::Kill => Signal::SIGKILL,
    };
    signal::kill(Pid::from_raw(raw), signal).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn send(pid: u32, _sig: Sig) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("signalling pid {pid} is only supported on unix"),
    ))
}
