#![allow(dead_code)]

//! In-memory stand-ins for every collaborator the supervisor talks to.
//!
//! Each fake is cheap to clone; clones share their recorded state, so a test
//! can hand one copy to the supervisor and inspect another afterwards.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use quorumctl::errors::{BuildError, LaunchError, QuorumError, Result};
use quorumctl::fs::MockFileSystem;
use quorumctl::launch::{LaunchRequest, LaunchStrategy};
use quorumctl::prep::{ArtifactBuilder, DatasetProvider, LogSpace, PortReservation, ToolchainProbe};
use quorumctl::registry::{ProcessHandle, ProcessRef, WaitOutcome, WorkerKey, WorkerProcess};
use quorumctl::supervisor::Collaborators;
use quorumctl::types::{BoxFuture, Presentation};

/// How a [`FakeWorker`] behaves once launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerBehaviour {
    /// Runs until asked to stop, then exits 0.
    RunUntilTerminated,
    /// Exits by itself with `code` after `after`; a stop request ends it early
    /// with 0.
    ExitAfter { after: Duration, code: i32 },
    /// Ignores the graceful request; only a kill stops it.
    IgnoreTerminate,
}

/// A signal delivered to a fake worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Terminate,
    Kill,
}

pub type SignalLog = Arc<Mutex<Vec<(WorkerKey, SignalKind)>>>;

#[derive(Debug)]
pub struct FakeWorker {
    key: WorkerKey,
    pid: u32,
    behaviour: WorkerBehaviour,
    started: Instant,
    ended: Option<WaitOutcome>,
    signals: SignalLog,
    output: Option<String>,
}

impl FakeWorker {
    pub fn new(key: WorkerKey, pid: u32, behaviour: WorkerBehaviour, signals: SignalLog) -> Self {
        Self {
            key,
            pid,
            behaviour,
            started: Instant::now(),
            ended: None,
            signals,
            output: None,
        }
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = Some(output.to_string());
        self
    }
}

impl WorkerProcess for FakeWorker {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn try_wait(&mut self) -> io::Result<Option<WaitOutcome>> {
        if self.ended.is_none() {
            if let WorkerBehaviour::ExitAfter { after, code } = self.behaviour {
                if self.started.elapsed() >= after {
                    self.ended = Some(WaitOutcome::Code(code));
                }
            }
        }
        Ok(self.ended)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.signals
            .lock()
            .unwrap()
            .push((self.key, SignalKind::Terminate));
        if self.ended.is_none() && self.behaviour != WorkerBehaviour::IgnoreTerminate {
            self.ended = Some(WaitOutcome::Code(0));
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.signals.lock().unwrap().push((self.key, SignalKind::Kill));
        if self.ended.is_none() {
            self.ended = Some(WaitOutcome::Signal(9));
        }
        Ok(())
    }

    fn captured_output(&self) -> Option<String> {
        self.output.clone()
    }
}

/// One call to [`FakeLauncher::launch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchRecord {
    pub key: WorkerKey,
    pub at: Instant,
    pub succeeded: bool,
}

/// Launch strategy that hands out [`FakeWorker`]s.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    default_behaviour: WorkerBehaviour,
    behaviours: Arc<Mutex<HashMap<WorkerKey, WorkerBehaviour>>>,
    failures: Arc<Mutex<HashMap<WorkerKey, String>>>,
    launches: Arc<Mutex<Vec<LaunchRecord>>>,
    signals: SignalLog,
    next_pid: Arc<AtomicU32>,
    presentation: Presentation,
}

impl FakeLauncher {
    pub fn new(default_behaviour: WorkerBehaviour) -> Self {
        Self {
            default_behaviour,
            behaviours: Arc::default(),
            failures: Arc::default(),
            launches: Arc::default(),
            signals: Arc::default(),
            next_pid: Arc::new(AtomicU32::new(40_000)),
            presentation: Presentation::Headless,
        }
    }

    /// Present handles as `presentation` (e.g. terminal windows).
    pub fn presenting(mut self, presentation: Presentation) -> Self {
        self.presentation = presentation;
        self
    }

    /// Override the behaviour of one worker.
    pub fn with_behaviour(self, key: WorkerKey, behaviour: WorkerBehaviour) -> Self {
        self.behaviours.lock().unwrap().insert(key, behaviour);
        self
    }

    /// Make the launch of `key` fail with `cause`.
    pub fn failing(self, key: WorkerKey, cause: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(key, cause.to_string());
        self
    }

    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.lock().unwrap().clone()
    }

    pub fn launched_keys(&self) -> Vec<WorkerKey> {
        self.launches().iter().map(|r| r.key).collect()
    }

    pub fn signals(&self) -> Vec<(WorkerKey, SignalKind)> {
        self.signals.lock().unwrap().clone()
    }

    pub fn signals_for(&self, key: WorkerKey) -> Vec<SignalKind> {
        self.signals()
            .into_iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, s)| s)
            .collect()
    }
}

impl LaunchStrategy for FakeLauncher {
    fn presentation(&self) -> Presentation {
        self.presentation
    }

    fn launch(&self, req: &LaunchRequest) -> std::result::Result<ProcessHandle, LaunchError> {
        let key = req.key();
        let failure = self.failures.lock().unwrap().get(&key).cloned();
        self.launches.lock().unwrap().push(LaunchRecord {
            key,
            at: Instant::now(),
            succeeded: failure.is_none(),
        });
        if let Some(cause) = failure {
            return Err(req.error(cause));
        }

        let behaviour = self
            .behaviours
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .unwrap_or(self.default_behaviour);
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let worker = FakeWorker::new(key, pid, behaviour, Arc::clone(&self.signals));

        Ok(ProcessHandle::new(
            key,
            self.presentation,
            ProcessRef::Local { pid: Some(pid) },
            Box::new(worker),
        ))
    }
}

/// Builder that returns a fixed result after an optional delay.
#[derive(Debug, Clone)]
pub struct FakeBuilder {
    result: std::result::Result<(), BuildError>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl FakeBuilder {
    pub fn succeeding() -> Self {
        Self {
            result: Ok(()),
            delay: Duration::ZERO,
            calls: Arc::default(),
        }
    }

    pub fn failing(error: BuildError) -> Self {
        Self {
            result: Err(error),
            ..Self::succeeding()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ArtifactBuilder for FakeBuilder {
    fn build(&self) -> BoxFuture<'_, std::result::Result<(), BuildError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone()
        })
    }
}

/// Port reservation that records what it was asked to free.
#[derive(Debug, Clone, Default)]
pub struct FakePorts {
    requested: Arc<Mutex<Vec<BTreeSet<u16>>>>,
    fail: bool,
}

impl FakePorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reclaim returns an error (which the supervisor must tolerate).
    pub fn erroring() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requested(&self) -> Vec<BTreeSet<u16>> {
        self.requested.lock().unwrap().clone()
    }
}

impl PortReservation for FakePorts {
    fn reclaim<'a>(&'a self, ports: &'a BTreeSet<u16>) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            self.requested.lock().unwrap().push(ports.clone());
            if self.fail {
                return Err(QuorumError::Precondition("no port inspector available".to_string()));
            }
            Ok(0)
        })
    }
}

#[derive(Debug, Clone)]
pub struct FakeToolchain {
    available: bool,
    probes: Arc<AtomicUsize>,
}

impl FakeToolchain {
    pub fn new(available: bool) -> Self {
        Self {
            available,
            probes: Arc::default(),
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl ToolchainProbe for FakeToolchain {
    fn is_toolchain_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.available
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeDataset {
    missing: bool,
    checked: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeDataset {
    pub fn present() -> Self {
        Self::default()
    }

    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    pub fn checked(&self) -> Vec<PathBuf> {
        self.checked.lock().unwrap().clone()
    }
}

impl DatasetProvider for FakeDataset {
    fn ensure_dataset_present(&self, path: &Path) -> Result<()> {
        self.checked.lock().unwrap().push(path.to_path_buf());
        if self.missing {
            return Err(QuorumError::Dataset(format!("{} does not exist", path.display())));
        }
        Ok(())
    }
}

/// A full set of fakes, plus the mock filesystem behind `LogSpace`.
#[derive(Debug, Clone)]
pub struct FakeWorld {
    pub ports: FakePorts,
    pub fs: MockFileSystem,
    pub toolchain: FakeToolchain,
    pub builder: FakeBuilder,
    pub dataset: FakeDataset,
    pub launcher: FakeLauncher,
}

impl FakeWorld {
    pub fn new(launcher: FakeLauncher) -> Self {
        Self {
            ports: FakePorts::new(),
            fs: MockFileSystem::new(),
            toolchain: FakeToolchain::new(true),
            builder: FakeBuilder::succeeding(),
            dataset: FakeDataset::present(),
            launcher,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            ports: Box::new(self.ports.clone()),
            log_space: LogSpace::new(Arc::new(self.fs.clone())),
            toolchain: Box::new(self.toolchain.clone()),
            builder: Box::new(self.builder.clone()),
            dataset: Box::new(self.dataset.clone()),
            launcher: Box::new(self.launcher.clone()),
        }
    }
}
