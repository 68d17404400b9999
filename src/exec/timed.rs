// src/exec/timed.rs

//! Run a command to completion with an upper time bound.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Error, Debug)]
pub enum ExecFailure {
    #[error("empty command line")]
    EmptyCommand,

    /// The program could not be started at all (missing binary, permissions).
    #[error("could not start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' did not finish within {after:?}")]
    TimedOut { program: String, after: Duration },

    #[error("waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExecFailure {
    /// True when the program itself is missing from `PATH`.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ExecFailure::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// Run `argv` in `cwd` (or the current directory) and collect its output.
///
/// The child is killed if `timeout` elapses; that case is reported as
/// [`ExecFailure::TimedOut`], never as a partial outcome.
pub async fn run_with_timeout(
    argv: &[String],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutcome, ExecFailure> {
    let (program, args) = argv.split_first().ok_or(ExecFailure::EmptyCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    debug!(program = %program, ?args, ?timeout, "running command");

    let child = cmd.spawn().map_err(|source| ExecFailure::Spawn {
        program: program.clone(),
        source,
    })?;

    // Dropping the `wait_with_output` future on timeout drops the child,
    // which kills it (`kill_on_drop`).
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(res) => res.map_err(|source| ExecFailure::Wait {
            program: program.clone(),
            source,
        })?,
        Err(_) => {
            return Err(ExecFailure::TimedOut {
                program: program.clone(),
                after: timeout,
            });
        }
    };

    let outcome = CommandOutcome {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    debug!(program = %program, code = ?outcome.code, "command finished");
    Ok(outcome)
}
