// src/launch/remote.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::info;

use crate::config::{ExperimentConfig, RemoteSettings};
use crate::config::validate::host_without_ssh_port;
use crate::errors::LaunchError;
use crate::exec::OutputTail;
use crate::registry::{LocalProcess, ProcessHandle, ProcessRef};
use crate::types::{Mode, Presentation, Role};

use super::command::WorkerCommand;
use super::headless::HeadlessLaunch;
use super::{LaunchRequest, LaunchStrategy};

/// Seconds `ssh` may spend establishing a connection.
pub const SSH_CONNECT_TIMEOUT_SECS: u32 = 10;

/// Starts nodes on their mapped hosts through `ssh`.
///
/// The handle tracks the local `ssh` session; the worker is considered gone
/// when that session ends. The client runs on `client_host` when one is
/// configured, otherwise locally and headless, still in remote networking
/// mode.
#[derive(Debug, Clone)]
pub struct RemoteLaunch {
    binary: PathBuf,
    remote: RemoteSettings,
    local_client: HeadlessLaunch,
}

impl RemoteLaunch {
    pub fn new(binary: PathBuf, remote: RemoteSettings, local_client: HeadlessLaunch) -> Self {
        Self {
            binary,
            remote,
            local_client,
        }
    }

    /// `None` unless the config is in remote mode.
    pub fn from_config(cfg: &ExperimentConfig) -> Option<Self> {
        let remote = cfg.remote.clone()?;
        Some(Self::new(
            cfg.binary.clone(),
            remote,
            HeadlessLaunch::new(cfg.binary_path(), Mode::Remote),
        ))
    }

    pub fn hosts(&self) -> &BTreeMap<u32, String> {
        &self.remote.hosts
    }

    fn host_for(&self, req: &LaunchRequest) -> Option<&str> {
        match (req.role, req.id) {
            (Role::Node, Some(id)) => self.remote.hosts.get(&id).map(String::as_str),
            (Role::Client, _) => self.remote.client_host.as_deref(),
            (Role::Node, None) => None,
        }
    }

    /// Full `ssh` argv for running `req` on `address`.
    pub fn ssh_argv(&self, address: &str, req: &LaunchRequest) -> Vec<String> {
        let program = remote_program(&self.binary);
        let worker = WorkerCommand::new(program, req.role, req.id, Mode::Remote, &req.extra_args);
        let remote_line = worker.shell_line(&self.remote.remote_dir, &req.endpoint);

        let mut argv: Vec<String> = [
            "ssh",
            "-tt",
            "-o",
            "BatchMode=yes",
            "-o",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        argv.push(format!("ConnectTimeout={SSH_CONNECT_TIMEOUT_SECS}"));

        if let Some(port) = ssh_port(address) {
            argv.push("-p".to_string());
            argv.push(port.to_string());
        }
        if let Some(identity) = &self.remote.identity_file {
            argv.push("-i".to_string());
            argv.push(identity.to_string_lossy().into_owned());
        }
        argv.push(ssh_destination(address, self.remote.user.as_deref()));
        argv.push(remote_line);
        argv
    }
}

impl LaunchStrategy for RemoteLaunch {
    fn presentation(&self) -> Presentation {
        Presentation::Remote
    }

    fn launch(&self, req: &LaunchRequest) -> Result<ProcessHandle, LaunchError> {
        let key = req.key();
        let address = match self.host_for(req) {
            Some(address) => address,
            None if req.role == Role::Client => return self.local_client.launch(req),
            None => return Err(req.error("no remote host is mapped to this node")),
        };

        let argv = self.ssh_argv(address, req);
        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| req.error(format!("failed to start ssh to {address}: {e}")))?;

        let tail = OutputTail::default();
        if let Some(stdout) = child.stdout.take() {
            tail.drain(stdout, key.to_string(), "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            tail.drain(stderr, key.to_string(), "stderr");
        }

        let pid = child.id();
        let host = host_without_ssh_port(address).to_string();
        info!(worker = %key, host = %host, ssh_pid = ?pid, "worker started remotely");

        let remote_ref = match pid {
            Some(pid) => format!("ssh session pid {pid}"),
            None => "ssh session".to_string(),
        };
        Ok(ProcessHandle::new(
            key,
            Presentation::Remote,
            ProcessRef::Remote { host, remote_ref },
            Box::new(LocalProcess::new(child, Some(tail))),
        ))
    }
}

/// Binary path as seen from inside the remote working directory.
fn remote_program(binary: &Path) -> String {
    if binary.is_absolute() || binary.components().count() > 1 {
        binary.to_string_lossy().into_owned()
    } else {
        format!("./{}", binary.display())
    }
}

/// `host:2222` -> `Some(2222)`.
pub fn ssh_port(address: &str) -> Option<u16> {
    let without_user = address.rsplit_once('@').map(|(_, h)| h).unwrap_or(address);
    without_user
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse().ok())
}

/// `[user@]host`, where an explicit user in `address` wins over `user`.
pub fn ssh_destination(address: &str, user: Option<&str>) -> String {
    let embedded_user = address.rsplit_once('@').map(|(u, _)| u);
    let host = host_without_ssh_port(address);
    match embedded_user.or(user) {
        Some(u) => format!("{u}@{host}"),
        None => host.to_string(),
    }
}
