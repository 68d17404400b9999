// src/supervisor/runtime.rs

use std::fmt;
use std::future::Future;

use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, warn};

use crate::config::ExperimentConfig;
use crate::errors::{LaunchError, QuorumError};
use crate::launch::{LaunchRequest, LaunchStrategy, TerminalEmulator, select_strategy};
use crate::prep::{
    ArtifactBuilder, CommandBuilder, CommandProbe, DatasetProvider, FileDataset, LogSpace,
    PortReclaimer, PortReservation, ToolchainProbe,
};
use crate::registry::{ProcessRegistry, WorkerKey, WorkerSummary};
use crate::types::{Presentation, WorkerExitPolicy};

use super::interrupt::Interrupt;
use super::shutdown::shutdown_barrier;
use super::state::{StateMachine, SupervisorState};

/// The supervisor's view of the outside world.
pub struct Collaborators {
    pub ports: Box<dyn PortReservation>,
    pub log_space: LogSpace,
    pub toolchain: Box<dyn ToolchainProbe>,
    pub builder: Box<dyn ArtifactBuilder>,
    pub dataset: Box<dyn DatasetProvider>,
    pub launcher: Box<dyn LaunchStrategy>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("log_space", &self.log_space)
            .field("presentation", &self.launcher.presentation())
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Real implementations, driven by `cfg`.
    pub fn from_config(cfg: &ExperimentConfig, terminal: Option<TerminalEmulator>) -> Self {
        let source_url = cfg.dataset.as_ref().and_then(|d| d.source_url.clone());
        Self {
            ports: Box::new(PortReclaimer::platform_default(
                cfg.timings.inspect_timeout,
                cfg.timings.port_recheck,
            )),
            log_space: LogSpace::default(),
            toolchain: Box::new(CommandProbe::new(
                cfg.build.toolchain_probe.clone(),
                cfg.timings.inspect_timeout,
            )),
            builder: Box::new(CommandBuilder::from_config(cfg)),
            dataset: Box::new(FileDataset::on_disk(source_url)),
            launcher: select_strategy(cfg, terminal),
        }
    }
}

/// What a finished run looked like.
#[derive(Debug)]
pub struct RunReport {
    pub final_state: SupervisorState,
    /// Every supervisor state visited, starting at `Idle`.
    pub history: Vec<SupervisorState>,
    /// Workers confirmed terminated, in launch order.
    pub workers: Vec<WorkerSummary>,
    /// Registry entries left that could not be confirmed terminated.
    pub remaining: usize,
    pub failure: Option<QuorumError>,
    pub interrupted: bool,
    /// Worker whose exit ended the run under [`WorkerExitPolicy::Abort`].
    pub aborted_by: Option<WorkerKey>,
    /// Workers that ignored the graceful request and were killed.
    pub forced_kills: usize,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.final_state == SupervisorState::Terminated && self.aborted_by.is_none()
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() { 0 } else { 1 }
    }
}

enum Step {
    Done,
    Interrupted,
    Failed(QuorumError),
}

/// Drives one run from `Idle` to `Terminated` or `Failed`.
///
/// All phases run on the calling task; workers are separate OS processes
/// observed through non-blocking polls.
pub struct Supervisor {
    cfg: ExperimentConfig,
    collab: Collaborators,
    machine: StateMachine,
    registry: ProcessRegistry,
    interrupt: Interrupt,
    workers: Vec<WorkerSummary>,
    forced_kills: usize,
    interrupted: bool,
    aborted_by: Option<WorkerKey>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("state", &self.machine.current())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(cfg: ExperimentConfig, collab: Collaborators, interrupt: Interrupt) -> Self {
        Self {
            cfg,
            collab,
            machine: StateMachine::new(),
            registry: ProcessRegistry::new(),
            interrupt,
            workers: Vec::new(),
            forced_kills: 0,
            interrupted: false,
            aborted_by: None,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.machine.current()
    }

    pub async fn run(mut self) -> RunReport {
        info!(
            nodes = self.cfg.node_count,
            mode = %self.cfg.mode,
            presentation = %self.collab.launcher.presentation(),
            "supervisor starting"
        );

        self.enter(SupervisorState::Cleaning);
        match self.clean().await {
            Step::Done => {}
            Step::Interrupted => return self.shut_down().await,
            Step::Failed(e) => return self.fail(e).await,
        }

        self.enter(SupervisorState::Building);
        match self.build().await {
            Step::Done => {}
            Step::Interrupted => return self.shut_down().await,
            Step::Failed(e) => return self.fail(e).await,
        }

        self.enter(SupervisorState::Launching);
        match self.launch_all().await {
            Step::Done => {}
            Step::Interrupted => return self.shut_down().await,
            Step::Failed(e) => return self.fail(e).await,
        }

        self.enter(SupervisorState::Running);
        self.monitor().await;
        self.shut_down().await
    }

    fn enter(&mut self, next: SupervisorState) {
        let from = self.machine.current();
        match self.machine.advance(next) {
            Ok(()) => info!(%from, to = %next, "supervisor state"),
            Err(e) => error!(error = %e, "ignored invalid supervisor transition"),
        }
    }

    async fn clean(&mut self) -> Step {
        let mut interrupt = self.interrupt.clone();
        let ports = &self.cfg.required_ports;
        match or_interrupt(&mut interrupt, self.collab.ports.reclaim(ports)).await {
            None => return Step::Interrupted,
            Some(Ok(freed)) => debug!(freed, "port reclaim finished"),
            Some(Err(e)) => warn!(error = %e, "port reclaim failed; continuing"),
        }

        let log_dir = self.cfg.log_dir_path();
        if let Err(e) = self.collab.log_space.reset(&log_dir, &self.cfg.known_log_files) {
            return Step::Failed(e);
        }

        if self.interrupt.is_triggered() {
            return Step::Interrupted;
        }
        Step::Done
    }

    async fn build(&mut self) -> Step {
        let mut interrupt = self.interrupt.clone();

        if self.cfg.build.skip {
            info!("build skipped");
        } else {
            match or_interrupt(&mut interrupt, self.collab.toolchain.is_toolchain_available()).await {
                None => return Step::Interrupted,
                Some(true) => {}
                Some(false) => warn!(
                    probe = ?self.cfg.build.toolchain_probe,
                    "toolchain not found; it is not installed automatically, attempting the build anyway"
                ),
            }

            match or_interrupt(&mut interrupt, self.collab.builder.build()).await {
                None => return Step::Interrupted,
                Some(Ok(())) => info!("build succeeded"),
                Some(Err(e)) => return Step::Failed(e.into()),
            }
        }

        if let Some(dataset) = &self.cfg.dataset {
            let path = self.cfg.working_dir.join(&dataset.path);
            if let Err(e) = self.collab.dataset.ensure_dataset_present(&path) {
                return Step::Failed(e);
            }
        }

        Step::Done
    }

    async fn launch_all(&mut self) -> Step {
        let mut interrupt = self.interrupt.clone();
        let timings = self.cfg.timings;

        for id in 0..self.cfg.node_count {
            if id > 0 {
                if or_interrupt(&mut interrupt, sleep(timings.node_launch_gap)).await.is_none() {
                    return Step::Interrupted;
                }
                if let Err(e) = self.check_launched() {
                    return Step::Failed(e);
                }
            }
            let Some(req) = LaunchRequest::for_node(&self.cfg, id) else {
                return Step::Failed(QuorumError::Config(format!("no endpoint for node {id}")));
            };
            if let Err(e) = self.launch_one(&req) {
                return Step::Failed(e);
            }
        }

        debug!(settle_ms = timings.settle.as_millis() as u64, "waiting for nodes to settle");
        if or_interrupt(&mut interrupt, sleep(timings.settle)).await.is_none() {
            return Step::Interrupted;
        }
        if let Err(e) = self.check_launched() {
            return Step::Failed(e);
        }

        let req = LaunchRequest::for_client(&self.cfg);
        if let Err(e) = self.launch_one(&req) {
            return Step::Failed(e);
        }

        info!(workers = self.registry.len(), "all workers launched");
        Step::Done
    }

    fn launch_one(&mut self, req: &LaunchRequest) -> Result<(), QuorumError> {
        let handle = self.collab.launcher.launch(req)?;
        self.registry
            .register(handle)
            .map_err(|e| QuorumError::Launch(req.error(e.to_string())))
    }

    /// Any worker that has already ended before `Running` fails the launch.
    ///
    /// A terminal window that hands off and exits cleanly is not counted.
    fn check_launched(&mut self) -> Result<(), QuorumError> {
        let ended = self.registry.poll_all().into_iter().find(|r| {
            let state = &r.worker.state;
            state.is_failure()
                || (state.is_terminal() && r.worker.presentation != Presentation::Foreground)
        });
        match ended {
            None => Ok(()),
            Some(result) => {
                let key = result.worker.key;
                let cause = match result.output.filter(|o| !o.trim().is_empty()) {
                    Some(output) => format!("{} during launch: {output}", result.worker.state),
                    None => format!("{} during launch", result.worker.state),
                };
                Err(QuorumError::Launch(LaunchError {
                    role: key.role,
                    id: key.id,
                    cause,
                }))
            }
        }
    }

    async fn monitor(&mut self) {
        let mut interrupt = self.interrupt.clone();
        let mut ticker = interval(self.cfg.timings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if or_interrupt(&mut interrupt, ticker.tick()).await.is_none() {
                info!("interrupt received while running");
                return;
            }

            for result in self.registry.poll_all() {
                if !result.transitioned || !result.worker.state.is_failure() {
                    continue;
                }
                if self.cfg.exit_policy == WorkerExitPolicy::Abort {
                    error!(worker = %result.worker.key, state = %result.worker.state, "worker failed; aborting run");
                    self.aborted_by = Some(result.worker.key);
                    return;
                }
            }

            if self.registry.live_count() == 0 {
                info!("all workers have exited");
                return;
            }
        }
    }

    async fn shut_down(mut self) -> RunReport {
        if self.interrupt.is_triggered() {
            self.interrupted = true;
        }
        self.enter(SupervisorState::ShuttingDown);
        self.drain_registry().await;
        self.enter(SupervisorState::Terminated);
        self.report(None)
    }

    async fn fail(mut self, cause: QuorumError) -> RunReport {
        error!(state = %self.machine.current(), error = %cause, "run failed");
        // Partially launched clusters are torn down before reporting.
        self.drain_registry().await;
        self.enter(SupervisorState::Failed);
        self.report(Some(cause))
    }

    async fn drain_registry(&mut self) {
        let outcome = shutdown_barrier(&mut self.registry, self.cfg.timings.grace_period).await;
        self.forced_kills += outcome.forced_kills;
        self.workers.extend(outcome.workers);
    }

    fn report(self, failure: Option<QuorumError>) -> RunReport {
        RunReport {
            final_state: self.machine.current(),
            history: self.machine.history().to_vec(),
            workers: self.workers,
            remaining: self.registry.len(),
            failure,
            interrupted: self.interrupted || self.interrupt.is_triggered(),
            aborted_by: self.aborted_by,
            forced_kills: self.forced_kills,
        }
    }
}

/// `None` if the interrupt fires before `fut` completes.
async fn or_interrupt<F: Future>(interrupt: &mut Interrupt, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = interrupt.wait() => None,
        out = fut => Some(out),
    }
}
