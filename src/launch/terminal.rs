// src/launch/terminal.rs

//! Foreground presentation: each worker in its own terminal emulator window.
//!
//! The handle returned here tracks the terminal process, not the worker
//! inside it. Some emulators (gnome-terminal in particular) hand the window
//! to a server and exit at once, so such a handle goes to `Exited(0)` while
//! the worker keeps running.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::LaunchError;
use crate::registry::{LocalProcess, ProcessHandle, ProcessRef};
use crate::types::Presentation;

use super::command::shell_quote;
use super::headless::HeadlessLaunch;
use super::{LaunchRequest, LaunchStrategy};

/// Terminal emulators we know how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalEmulator {
    GnomeTerminal,
    Xterm,
    Konsole,
    Xfce4Terminal,
    MateTerminal,
    LxTerminal,
    Terminator,
    Alacritty,
    Kitty,
}

/// Probe order; the first one found on `PATH` wins.
pub const PREFERENCE_ORDER: [TerminalEmulator; 9] = [
    TerminalEmulator::GnomeTerminal,
    TerminalEmulator::Xterm,
    TerminalEmulator::Konsole,
    TerminalEmulator::Xfce4Terminal,
    TerminalEmulator::MateTerminal,
    TerminalEmulator::LxTerminal,
    TerminalEmulator::Terminator,
    TerminalEmulator::Alacritty,
    TerminalEmulator::Kitty,
];

impl TerminalEmulator {
    pub fn program(&self) -> &'static str {
        match self {
            TerminalEmulator::GnomeTerminal => "gnome-terminal",
            TerminalEmulator::Xterm => "xterm",
            TerminalEmulator::Konsole => "konsole",
            TerminalEmulator::Xfce4Terminal => "xfce4-terminal",
            TerminalEmulator::MateTerminal => "mate-terminal",
            TerminalEmulator::LxTerminal => "lxterminal",
            TerminalEmulator::Terminator => "terminator",
            TerminalEmulator::Alacritty => "alacritty",
            TerminalEmulator::Kitty => "kitty",
        }
    }

    /// Arguments (after the program name) that run `script` in `bash` and
    /// keep the window open once it finishes.
    pub fn args(&self, script: &str) -> Vec<String> {
        let keep_open = format!("{script}; exec bash");
        let bash = |prefix: &[&str]| {
            let mut v: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
            v.extend(["bash".to_string(), "-c".to_string(), keep_open.clone()]);
            v
        };
        match self {
            TerminalEmulator::GnomeTerminal => bash(&["--"]),
            TerminalEmulator::Xterm | TerminalEmulator::Konsole | TerminalEmulator::Alacritty => {
                bash(&["-e"])
            }
            TerminalEmulator::Xfce4Terminal
            | TerminalEmulator::MateTerminal
            | TerminalEmulator::Terminator => bash(&["-x"]),
            // lxterminal only takes a single command string.
            TerminalEmulator::LxTerminal => {
                vec!["-e".to_string(), format!("bash -c {}", shell_quote(&keep_open))]
            }
            TerminalEmulator::Kitty => bash(&[]),
        }
    }
}

/// First terminal in [`PREFERENCE_ORDER`] found in `path_var`.
///
/// Without a display there is nothing to open a window on, so this returns
/// `None` regardless of what is installed.
pub fn probe_terminal(display_present: bool, path_var: Option<&OsStr>) -> Option<TerminalEmulator> {
    if !display_present {
        return None;
    }
    let path_var = path_var?;
    let dirs: Vec<PathBuf> = std::env::split_paths(path_var).collect();
    PREFERENCE_ORDER
        .into_iter()
        .find(|t| dirs.iter().any(|d| is_executable(&d.join(t.program()))))
}

/// [`probe_terminal`] against the current process environment.
///
/// Only Linux desktops are probed; elsewhere this is always `None`.
pub fn detect_terminal() -> Option<TerminalEmulator> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let display_present = ["DISPLAY", "WAYLAND_DISPLAY"]
        .iter()
        .any(|var| std::env::var_os(var).is_some_and(|v| !v.is_empty()));
    let path_var = std::env::var_os("PATH");
    probe_terminal(display_present, path_var.as_deref())
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Opens one terminal window per worker.
///
/// If the terminal cannot be spawned because its program is gone, that one
/// launch falls back to [`HeadlessLaunch`].
#[derive(Debug, Clone)]
pub struct ForegroundLaunch {
    terminal: TerminalEmulator,
    headless: HeadlessLaunch,
}

impl ForegroundLaunch {
    pub fn new(terminal: TerminalEmulator, headless: HeadlessLaunch) -> Self {
        Self { terminal, headless }
    }

    pub fn terminal(&self) -> TerminalEmulator {
        self.terminal
    }

    pub fn terminal_argv(&self, req: &LaunchRequest) -> Vec<String> {
        let script = self
            .headless
            .command(req)
            .shell_line(&req.working_dir, &req.endpoint);
        let mut argv = vec![self.terminal.program().to_string()];
        argv.extend(self.terminal.args(&script));
        argv
    }
}

impl LaunchStrategy for ForegroundLaunch {
    fn presentation(&self) -> Presentation {
        Presentation::Foreground
    }

    fn launch(&self, req: &LaunchRequest) -> Result<ProcessHandle, LaunchError> {
        let key = req.key();
        let argv = self.terminal_argv(req);

        let spawned = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(&req.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(child) => {
                let pid = child.id();
                info!(worker = %key, terminal = self.terminal.program(), pid = ?pid, "worker started in terminal");
                if self.terminal == TerminalEmulator::GnomeTerminal {
                    debug!(worker = %key, "gnome-terminal detaches; its exit does not mean the worker stopped");
                }
                Ok(ProcessHandle::new(
                    key,
                    Presentation::Foreground,
                    ProcessRef::Local { pid },
                    Box::new(LocalProcess::new(child, None)),
                ))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    worker = %key,
                    terminal = self.terminal.program(),
                    "terminal emulator disappeared; launching headless instead"
                );
                self.headless.spawn(req, Presentation::Headless)
            }
            Err(e) => Err(req.error(format!(
                "failed to open {}: {e}",
                self.terminal.program()
            ))),
        }
    }
}
