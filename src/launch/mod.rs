// src/launch/mod.rs

//! LaunchStrategy: turn a worker request into a running, supervised process.
//!
//! Three presentations exist:
//! - [`ForegroundLaunch`]: a terminal emulator window per worker;
//! - [`HeadlessLaunch`]: a detached child with captured output;
//! - [`RemoteLaunch`]: an `ssh` session to the node's mapped host.
//!
//! [`select_strategy`] picks one at startup and it is used for every worker
//! of the run.

pub mod command;
pub mod headless;
pub mod remote;
pub mod terminal;

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::ExperimentConfig;
use crate::errors::LaunchError;
use crate::registry::{ProcessHandle, WorkerKey};
use crate::types::{Endpoint, Mode, Presentation, Role};

pub use command::{ENDPOINT_ENV_VAR, WorkerCommand, shell_quote};
pub use headless::HeadlessLaunch;
pub use remote::RemoteLaunch;
pub use terminal::{ForegroundLaunch, TerminalEmulator, detect_terminal, probe_terminal};

/// Everything a strategy needs to start one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub role: Role,
    pub id: Option<u32>,
    pub working_dir: PathBuf,
    pub endpoint: Endpoint,
    pub extra_args: Vec<String>,
}

impl LaunchRequest {
    /// Request for node `id`. `None` if `id` is outside the cluster.
    pub fn for_node(cfg: &ExperimentConfig, id: u32) -> Option<Self> {
        let endpoint = cfg.node_endpoint(id)?.clone();
        Some(Self {
            role: Role::Node,
            id: Some(id),
            working_dir: cfg.working_dir.clone(),
            endpoint,
            extra_args: cfg.extra_args.clone(),
        })
    }

    pub fn for_client(cfg: &ExperimentConfig) -> Self {
        Self {
            role: Role::Client,
            id: None,
            working_dir: cfg.working_dir.clone(),
            endpoint: cfg.client_endpoint.clone(),
            extra_args: cfg.extra_args.clone(),
        }
    }

    pub fn key(&self) -> WorkerKey {
        WorkerKey {
            role: self.role,
            id: self.id,
        }
    }

    pub fn error(&self, cause: impl Into<String>) -> LaunchError {
        LaunchError {
            role: self.role,
            id: self.id,
            cause: cause.into(),
        }
    }
}

/// Starts one worker and hands back its handle.
///
/// Launching does not wait for the worker to become ready; the returned
/// handle starts in `Starting`.
pub trait LaunchStrategy: Send + Sync {
    fn presentation(&self) -> Presentation;

    fn launch(&self, req: &LaunchRequest) -> Result<ProcessHandle, LaunchError>;
}

/// Pick the strategy for this run.
///
/// `terminal` is the result of the terminal probe; in local mode a missing
/// terminal downgrades to headless.
pub fn select_strategy(
    cfg: &ExperimentConfig,
    terminal: Option<TerminalEmulator>,
) -> Box<dyn LaunchStrategy> {
    let headless = HeadlessLaunch::new(cfg.binary_path(), cfg.mode);

    let strategy: Box<dyn LaunchStrategy> = match cfg.mode {
        Mode::Remote => match RemoteLaunch::from_config(cfg) {
            Some(remote) => Box::new(remote),
            None => {
                warn!("remote mode without remote settings; launching headless");
                Box::new(headless)
            }
        },
        Mode::Headless => Box::new(headless),
        Mode::Local => match terminal {
            Some(t) => {
                info!(terminal = t.program(), "using terminal emulator");
                Box::new(ForegroundLaunch::new(t, headless))
            }
            None => {
                warn!("no terminal emulator or display available; falling back to headless");
                Box::new(headless)
            }
        },
    };

    info!(presentation = %strategy.presentation(), "launch strategy selected");
    strategy
}
