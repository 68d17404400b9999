// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod launch;
pub mod logging;
pub mod prep;
pub mod registry;
pub mod supervisor;
pub mod types;

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ExperimentConfig, Overrides, load_experiment};
use crate::launch::{LaunchRequest, TerminalEmulator, WorkerCommand, detect_terminal};
use crate::supervisor::{Collaborators, InterruptHandle, RunReport, Supervisor, interrupt_channel};
use crate::types::Mode;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - terminal probing and strategy selection
/// - the supervisor and its real collaborators
/// - Ctrl-C / SIGTERM handling
///
/// Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let overrides = overrides_from_args(&args);
    let config_path = args.config.as_ref().map(PathBuf::from);
    let cfg = load_experiment(config_path.as_deref(), overrides)?;

    let terminal = match cfg.mode {
        Mode::Local => detect_terminal(),
        Mode::Headless | Mode::Remote => None,
    };

    if args.dry_run {
        print!("{}", dry_run_plan(&cfg, terminal));
        return Ok(0);
    }

    let (trigger, interrupt) = interrupt_channel();
    spawn_signal_listeners(trigger);

    let collab = Collaborators::from_config(&cfg, terminal);
    let report = Supervisor::new(cfg, collab, interrupt).run().await;

    print!("{}", run_summary(&report));
    if let Some(failure) = &report.failure {
        eprintln!("quorumctl: run failed: {failure}");
    }
    Ok(report.exit_code())
}

/// CLI flags as config overrides. `--remote` wins over `--headless`.
pub fn overrides_from_args(args: &CliArgs) -> Overrides {
    let mode = if args.remote {
        Mode::Remote
    } else if args.headless {
        Mode::Headless
    } else {
        Mode::Local
    };
    Overrides {
        node_count: args.node_count,
        mode,
        skip_build: args.skip_build,
        abort_on_worker_exit: args.abort_on_worker_exit,
    }
}

/// Ctrl-C → shutdown request; on Unix SIGTERM as well.
fn spawn_signal_listeners(trigger: InterruptHandle) {
    {
        let trigger = trigger.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                    return;
                }
                info!("Ctrl+C received; shutting down");
                trigger.trigger();
            }
        });
    }

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                return;
            }
        };
        while term.recv().await.is_some() {
            info!("SIGTERM received; shutting down");
            trigger.trigger();
        }
    });

    #[cfg(not(unix))]
    drop(trigger);
}

/// What a run would do, without doing any of it.
pub fn dry_run_plan(cfg: &ExperimentConfig, terminal: Option<TerminalEmulator>) -> String {
    let mut out = String::new();
    let presentation = match (cfg.mode, terminal) {
        (Mode::Remote, _) => "remote (ssh)".to_string(),
        (Mode::Headless, _) | (Mode::Local, None) => "headless".to_string(),
        (Mode::Local, Some(t)) => format!("foreground ({})", t.program()),
    };

    let _ = writeln!(out, "quorumctl dry-run");
    let _ = writeln!(out, "  nodes = {}", cfg.node_count);
    let _ = writeln!(out, "  mode = {}", cfg.mode);
    let _ = writeln!(out, "  presentation = {presentation}");
    let _ = writeln!(out, "  working_dir = {}", cfg.working_dir.display());
    let _ = writeln!(out, "  log_dir = {}", cfg.log_dir_path().display());
    let ports: Vec<String> = cfg.required_ports.iter().map(u16::to_string).collect();
    let _ = writeln!(out, "  ports = [{}]", ports.join(", "));
    let _ = writeln!(out, "  exit_policy = {:?}", cfg.exit_policy);
    if cfg.build.skip {
        let _ = writeln!(out, "  build = skipped");
    } else {
        let _ = writeln!(out, "  build = {} && {}", cfg.build.resolve.join(" "), cfg.build.compile.join(" "));
    }
    if let Some(dataset) = &cfg.dataset {
        let _ = writeln!(out, "  dataset = {}", dataset.path.display());
    }
    let _ = writeln!(out);

    let binary = cfg.binary_path();
    let mut requests: Vec<LaunchRequest> = (0..cfg.node_count)
        .filter_map(|id| LaunchRequest::for_node(cfg, id))
        .collect();
    requests.push(LaunchRequest::for_client(cfg));

    let _ = writeln!(out, "launch order ({}):", requests.len());
    for req in &requests {
        let cmd = WorkerCommand::new(
            binary.to_string_lossy(),
            req.role,
            req.id,
            cfg.mode,
            &req.extra_args,
        );
        let host = match req.id {
            Some(id) => cfg.remote_host(id),
            None => cfg.remote.as_ref().and_then(|r| r.client_host.as_deref()),
        };
        let _ = writeln!(out, "  - {} @ {}", req.key(), req.endpoint);
        if let Some(host) = host {
            let _ = writeln!(out, "      host: {host}");
        }
        let _ = writeln!(out, "      cmd: {}", cmd.shell_words());
    }

    debug!("dry-run complete (no execution)");
    out
}

/// One line per worker with its final state.
pub fn run_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "run {} ({} workers)", report.final_state, report.workers.len());
    for worker in &report.workers {
        let _ = writeln!(
            out,
            "  {:<8} {:<12} {}",
            worker.key.to_string(),
            worker.state.to_string(),
            worker.process_ref
        );
    }
    if report.remaining > 0 {
        let _ = writeln!(out, "  {} worker(s) not confirmed terminated", report.remaining);
    }
    if report.forced_kills > 0 {
        let _ = writeln!(out, "  {} worker(s) force-killed after the grace period", report.forced_kills);
    }
    if let Some(key) = report.aborted_by {
        let _ = writeln!(out, "  aborted: {key} failed while the cluster was running");
    }
    out
}
