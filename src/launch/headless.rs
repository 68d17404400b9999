// src/launch/headless.rs

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::info;

use crate::errors::LaunchError;
use crate::exec::OutputTail;
use crate::registry::{LocalProcess, ProcessHandle, ProcessRef};
use crate::types::{Mode, Presentation};

use super::command::{ENDPOINT_ENV_VAR, WorkerCommand};
use super::{LaunchRequest, LaunchStrategy};

/// Spawns the worker directly, detached from any terminal, with stdout and
/// stderr captured into a bounded tail.
///
/// The handle tracks the worker's own pid.
#[derive(Debug, Clone)]
pub struct HeadlessLaunch {
    binary: PathBuf,
    mode: Mode,
}

impl HeadlessLaunch {
    pub fn new(binary: PathBuf, mode: Mode) -> Self {
        Self { binary, mode }
    }

    pub fn command(&self, req: &LaunchRequest) -> WorkerCommand {
        WorkerCommand::new(
            self.binary.to_string_lossy(),
            req.role,
            req.id,
            self.mode,
            &req.extra_args,
        )
    }

    pub(crate) fn spawn(
        &self,
        req: &LaunchRequest,
        presentation: Presentation,
    ) -> Result<ProcessHandle, LaunchError> {
        let worker = self.command(req);
        let key = req.key();

        let mut command = Command::new(&worker.program);
        command
            .args(&worker.args)
            .current_dir(&req.working_dir)
            .env(ENDPOINT_ENV_VAR, req.endpoint.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group: a terminal Ctrl-C reaches only the supervisor.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| req.error(format!("failed to spawn {}: {e}", worker.program)))?;

        let tail = OutputTail::default();
        if let Some(stdout) = child.stdout.take() {
            tail.drain(stdout, key.to_string(), "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            tail.drain(stderr, key.to_string(), "stderr");
        }

        let pid = child.id();
        info!(worker = %key, pid = ?pid, endpoint = %req.endpoint, "worker started headless");

        Ok(ProcessHandle::new(
            key,
            presentation,
            ProcessRef::Local { pid },
            Box::new(LocalProcess::new(child, Some(tail))),
        ))
    }
}

impl LaunchStrategy for HeadlessLaunch {
    fn presentation(&self) -> Presentation {
        Presentation::Headless
    }

    fn launch(&self, req: &LaunchRequest) -> Result<ProcessHandle, LaunchError> {
        self.spawn(req, Presentation::Headless)
    }
}
