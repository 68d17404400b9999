// tests/cli_and_reporting.rs

mod common;
use crate::common::ExperimentConfigBuilder;
use crate::common::fakes::{FakeLauncher, FakeWorld, WorkerBehaviour};

use std::time::Duration;

use clap::Parser;
use tracing::Level;

use quorumctl::cli::{CliArgs, LogLevel};
use quorumctl::launch::TerminalEmulator;
use quorumctl::logging::{filter_directive, parse_level_str, resolve_level};
use quorumctl::supervisor::{Interrupt, Supervisor};
use quorumctl::types::Mode;
use quorumctl::{dry_run_plan, overrides_from_args, run_summary};

#[test]
fn node_count_defaults_to_four() {
    let args = CliArgs::try_parse_from(["quorumctl"]).unwrap();
    assert_eq!(args.node_count, 4);
    assert!(!args.headless);
    assert!(!args.dry_run);
}

#[test]
fn node_count_out_of_range_is_a_usage_error() {
    for bad in ["0", "11", "four"] {
        assert!(
            CliArgs::try_parse_from(["quorumctl", bad]).is_err(),
            "{bad} should be rejected"
        );
    }
    let args = CliArgs::try_parse_from(["quorumctl", "10", "--headless"]).unwrap();
    assert_eq!(args.node_count, 10);
}

#[test]
fn headless_and_remote_conflict() {
    assert!(CliArgs::try_parse_from(["quorumctl", "--headless", "--remote"]).is_err());
}

#[test]
fn flags_become_overrides() {
    let args =
        CliArgs::try_parse_from(["quorumctl", "3", "--skip-build", "--abort-on-worker-exit"])
            .unwrap();
    let overrides = overrides_from_args(&args);
    assert_eq!(overrides.node_count, 3);
    assert_eq!(overrides.mode, Mode::Local);
    assert!(overrides.skip_build);
    assert!(overrides.abort_on_worker_exit);

    let headless = CliArgs::try_parse_from(["quorumctl", "--headless"]).unwrap();
    assert_eq!(overrides_from_args(&headless).mode, Mode::Headless);
    let remote = CliArgs::try_parse_from(["quorumctl", "--remote"]).unwrap();
    assert_eq!(overrides_from_args(&remote).mode, Mode::Remote);
}

#[test]
fn log_level_resolution_prefers_cli_then_env() {
    assert_eq!(resolve_level(Some(LogLevel::Debug), Some("error")), Level::DEBUG);
    assert_eq!(resolve_level(None, Some("warn")), Level::WARN);
    assert_eq!(resolve_level(None, Some("nonsense")), Level::INFO);
    assert_eq!(resolve_level(None, None), Level::INFO);
    assert_eq!(parse_level_str(" TRACE "), Some(Level::TRACE));
    assert_eq!(filter_directive(Level::DEBUG), "warn,quorumctl=debug");
}

#[test]
fn dry_run_lists_launch_order_and_ports() {
    let cfg = ExperimentConfigBuilder::new()
        .nodes(2)
        .mode(Mode::Local)
        .working_dir("/exp")
        .build();

    let plan = dry_run_plan(&cfg, Some(TerminalEmulator::Xterm));

    assert!(plan.contains("presentation = foreground (xterm)"));
    assert!(plan.contains("ports = [20000, 28000, 28100]"));
    let node0 = plan.find("- node 0 @ 127.0.0.1:28000").unwrap();
    let node1 = plan.find("- node 1 @ 127.0.0.1:28100").unwrap();
    let client = plan.find("- client @ 127.0.0.1:20000").unwrap();
    assert!(node0 < node1 && node1 < client);
    assert!(plan.contains("cmd: /exp/pbft_main -r node -m local -n 1"));

    let fallback = dry_run_plan(&cfg, None);
    assert!(fallback.contains("presentation = headless"));
}

#[test]
fn dry_run_shows_remote_hosts() {
    let cfg = ExperimentConfigBuilder::new()
        .nodes(1)
        .mode(Mode::Remote)
        .remote_hosts(&[(0, "10.0.0.5")])
        .build();

    let plan = dry_run_plan(&cfg, None);

    assert!(plan.contains("presentation = remote (ssh)"));
    assert!(plan.contains("host: 10.0.0.5"));
}

#[tokio::test]
async fn summary_has_one_line_per_worker() {
    let cfg = ExperimentConfigBuilder::new().nodes(2).build();
    let world = FakeWorld::new(FakeLauncher::new(WorkerBehaviour::ExitAfter {
        after: Duration::from_millis(150),
        code: 0,
    }));
    let report = Supervisor::new(cfg, world.collaborators(), Interrupt::never())
        .run()
        .await;

    let summary = run_summary(&report);
    let lines: Vec<&str> = summary.lines().collect();

    assert_eq!(lines[0], "run terminated (3 workers)");
    assert_eq!(lines.len(), 4);
    assert!(lines[1].contains("node 0") && lines[1].contains("exited(0)"));
    assert!(lines[3].contains("client"));
}
