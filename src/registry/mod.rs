// src/registry/mod.rs

//! Process registry: the single owner of every supervised worker handle.
//!
//! Invariants:
//! - entries keep launch order (nodes by ascending id, then the client);
//! - no two entries share the same `(role, id)`;
//! - an entry is only removed once its process is confirmed terminated.

pub mod process;

use std::fmt;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{Presentation, Role};

pub use process::{LocalProcess, WaitOutcome, WorkerProcess};

/// Identity of a supervised worker: `(role, id)`.
///
/// Ordering puts nodes (by id) before the client, matching launch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerKey {
    pub role: Role,
    pub id: Option<u32>,
}

impl WorkerKey {
    pub fn node(id: u32) -> Self {
        Self {
            role: Role::Node,
            id: Some(id),
        }
    }

    pub fn client() -> Self {
        Self {
            role: Role::Client,
            id: None,
        }
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} {}", self.role, id),
            None => write!(f, "{}", self.role),
        }
    }
}

/// Lifecycle of one supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Exited(i32),
    Failed(String),
}

impl ProcessState {
    pub fn is_live(&self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }

    /// Terminal and not a clean `Exited(0)`.
    pub fn is_failure(&self) -> bool {
        match self {
            ProcessState::Exited(code) => *code != 0,
            ProcessState::Failed(_) => true,
            ProcessState::Starting | ProcessState::Running => false,
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Starting => f.write_str("starting"),
            ProcessState::Running => f.write_str("running"),
            ProcessState::Exited(code) => write!(f, "exited({code})"),
            ProcessState::Failed(cause) => write!(f, "failed({cause})"),
        }
    }
}

impl From<WaitOutcome> for ProcessState {
    fn from(outcome: WaitOutcome) -> Self {
        match outcome {
            WaitOutcome::Code(code) => ProcessState::Exited(code),
            WaitOutcome::Signal(sig) => ProcessState::Failed(format!("killed by signal {sig}")),
            WaitOutcome::Unknown => ProcessState::Failed("exit status unavailable".to_string()),
        }
    }
}

/// What the handle points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessRef {
    Local { pid: Option<u32> },
    Remote { host: String, remote_ref: String },
}

impl fmt::Display for ProcessRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessRef::Local { pid: Some(pid) } => write!(f, "pid {pid}"),
            ProcessRef::Local { pid: None } => f.write_str("pid ?"),
            ProcessRef::Remote { host, remote_ref } => write!(f, "{host} ({remote_ref})"),
        }
    }
}

/// One supervised process.
///
/// Only [`ProcessRegistry`] changes `state` after creation.
pub struct ProcessHandle {
    key: WorkerKey,
    presentation: Presentation,
    process_ref: ProcessRef,
    launched_at: Instant,
    state: ProcessState,
    process: Box<dyn WorkerProcess>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("key", &self.key)
            .field("presentation", &self.presentation)
            .field("process_ref", &self.process_ref)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    pub fn new(
        key: WorkerKey,
        presentation: Presentation,
        process_ref: ProcessRef,
        process: Box<dyn WorkerProcess>,
    ) -> Self {
        Self {
            key,
            presentation,
            process_ref,
            launched_at: Instant::now(),
            state: ProcessState::Starting,
            process,
        }
    }

    pub fn key(&self) -> WorkerKey {
        self.key
    }

    pub fn role(&self) -> Role {
        self.key.role
    }

    pub fn id(&self) -> Option<u32> {
        self.key.id
    }

    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    pub fn process_ref(&self) -> &ProcessRef {
        &self.process_ref
    }

    pub fn launched_at(&self) -> Instant {
        self.launched_at
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    pub fn captured_output(&self) -> Option<String> {
        self.process.captured_output()
    }

    fn set_state(&mut self, next: ProcessState) -> bool {
        if self.state == next {
            return false;
        }
        debug!(worker = %self.key, from = %self.state, to = %next, "process state change");
        self.state = next;
        true
    }

    /// Non-blocking liveness check. Returns whether the state changed.
    fn poll(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        match self.process.try_wait() {
            Ok(None) => self.set_state(ProcessState::Running),
            Ok(Some(outcome)) => self.set_state(ProcessState::from(outcome)),
            Err(e) => self.set_state(ProcessState::Failed(format!("wait failed: {e}"))),
        }
    }

    fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            key: self.key,
            presentation: self.presentation,
            process_ref: self.process_ref.clone(),
            launched_at: self.launched_at,
            state: self.state.clone(),
        }
    }
}

/// Detached view of a handle, safe to keep after the handle is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub key: WorkerKey,
    pub presentation: Presentation,
    pub process_ref: ProcessRef,
    pub launched_at: Instant,
    pub state: ProcessState,
}

/// Result of one liveness check in [`ProcessRegistry::poll_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    pub worker: WorkerSummary,
    pub transitioned: bool,
    pub output: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} is already registered")]
    Duplicate(WorkerKey),

    #[error("{0} is not registered")]
    Unknown(WorkerKey),

    #[error("{0} is still running and cannot be removed")]
    StillRunning(WorkerKey),
}

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    handles: Vec<ProcessHandle>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handle: ProcessHandle) -> Result<(), RegistryError> {
        if self.handles.iter().any(|h| h.key == handle.key) {
            return Err(RegistryError::Duplicate(handle.key));
        }
        info!(
            worker = %handle.key,
            presentation = %handle.presentation,
            process = %handle.process_ref,
            "registered worker"
        );
        self.handles.push(handle);
        Ok(())
    }

    /// Check every live handle once, without blocking.
    ///
    /// Exits are logged here, with whatever output was captured.
    pub fn poll_all(&mut self) -> Vec<PollResult> {
        let mut results = Vec::with_capacity(self.handles.len());
        for handle in self.handles.iter_mut() {
            let transitioned = handle.poll();
            let output = if transitioned && handle.state.is_terminal() {
                let output = handle.captured_output();
                log_exit(handle, output.as_deref());
                output
            } else {
                None
            };
            results.push(PollResult {
                worker: handle.summary(),
                transitioned,
                output,
            });
        }
        results
    }

    /// Remove a handle whose process has terminated.
    pub fn remove(&mut self, key: WorkerKey) -> Result<ProcessHandle, RegistryError> {
        let idx = self
            .handles
            .iter()
            .position(|h| h.key == key)
            .ok_or(RegistryError::Unknown(key))?;
        if self.handles[idx].state.is_live() {
            return Err(RegistryError::StillRunning(key));
        }
        Ok(self.handles.remove(idx))
    }

    /// Remove every terminated handle, in launch order.
    pub fn drain_terminated(&mut self) -> Vec<WorkerSummary> {
        let keys: Vec<WorkerKey> = self
            .handles
            .iter()
            .filter(|h| h.state.is_terminal())
            .map(|h| h.key)
            .collect();
        keys.into_iter()
            .filter_map(|k| self.remove(k).ok())
            .map(|h| h.summary())
            .collect()
    }

    /// Send a graceful stop request to every live handle.
    ///
    /// Returns the workers that were asked to stop.
    pub fn request_termination_all(&mut self) -> Vec<WorkerKey> {
        let mut asked = Vec::new();
        for handle in self.handles.iter_mut().filter(|h| h.state.is_live()) {
            match handle.process.terminate() {
                Ok(()) => debug!(worker = %handle.key, "sent termination request"),
                Err(e) => warn!(worker = %handle.key, error = %e, "termination request failed"),
            }
            asked.push(handle.key);
        }
        asked
    }

    /// Force-kill every handle that is still live.
    pub fn force_kill_live(&mut self) -> Vec<WorkerKey> {
        let mut killed = Vec::new();
        for handle in self.handles.iter_mut().filter(|h| h.state.is_live()) {
            if let Err(e) = handle.process.kill() {
                warn!(worker = %handle.key, error = %e, "force kill failed");
            }
            killed.push(handle.key);
        }
        killed
    }

    pub fn get(&self, key: WorkerKey) -> Option<&ProcessHandle> {
        self.handles.iter().find(|h| h.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessHandle> {
        self.handles.iter()
    }

    pub fn keys(&self) -> Vec<WorkerKey> {
        self.handles.iter().map(|h| h.key).collect()
    }

    pub fn live_count(&self) -> usize {
        self.handles.iter().filter(|h| h.state.is_live()).count()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

fn log_exit(handle: &ProcessHandle, output: Option<&str>) {
    let output = output.unwrap_or("");
    match &handle.state {
        ProcessState::Exited(0) => {
            info!(worker = %handle.key, process = %handle.process_ref, "worker exited cleanly");
        }
        ProcessState::Exited(code) => {
            warn!(
                worker = %handle.key,
                process = %handle.process_ref,
                exit_code = code,
                output = %output,
                "worker exited with failure"
            );
        }
        ProcessState::Failed(cause) => {
            warn!(
                worker = %handle.key,
                process = %handle.process_ref,
                cause = %cause,
                output = %output,
                "worker failed"
            );
        }
        ProcessState::Starting | ProcessState::Running => {}
    }
}
