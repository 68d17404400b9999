// tests/artifact_build.rs
#![cfg(unix)]

mod common;
use crate::common::{ExperimentConfigBuilder, init_tracing, with_timeout};

use std::time::Duration;

use quorumctl::errors::BuildStage;
use quorumctl::exec::{ExecFailure, run_with_timeout};
use quorumctl::prep::{ArtifactBuilder, BuildStep, CommandBuilder};

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn step(stage: BuildStage, script: &str, timeout_ms: u64) -> BuildStep {
    BuildStep {
        stage,
        argv: sh(script),
        timeout: Duration::from_millis(timeout_ms),
    }
}

#[tokio::test]
async fn both_stages_run_in_order_inside_working_dir() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let builder = CommandBuilder::new(
        dir.path().to_path_buf(),
        vec![
            step(BuildStage::DependencyResolution, "echo resolved > order.txt", 5_000),
            step(BuildStage::Compilation, "echo compiled >> order.txt", 5_000),
        ],
    );

    with_timeout(builder.build()).await.unwrap();

    let order = std::fs::read_to_string(dir.path().join("order.txt")).unwrap();
    assert_eq!(order, "resolved\ncompiled\n");
}

#[tokio::test]
async fn failing_stage_reports_stderr_verbatim_and_stops() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let builder = CommandBuilder::new(
        dir.path().to_path_buf(),
        vec![
            step(BuildStage::DependencyResolution, "echo 'missing module foo' >&2; exit 3", 5_000),
            step(BuildStage::Compilation, "touch compiled", 5_000),
        ],
    );

    let err = with_timeout(builder.build()).await.unwrap_err();

    assert_eq!(err.stage, BuildStage::DependencyResolution);
    assert_eq!(err.stderr, "missing module foo\n");
    assert!(!dir.path().join("compiled").exists());
}

#[tokio::test]
async fn silent_failure_names_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let builder = CommandBuilder::new(
        dir.path().to_path_buf(),
        vec![step(BuildStage::Compilation, "exit 2", 5_000)],
    );

    let err = with_timeout(builder.build()).await.unwrap_err();

    assert_eq!(err.stage, BuildStage::Compilation);
    assert!(err.stderr.contains("exit 2"), "got: {}", err.stderr);
}

#[tokio::test]
async fn slow_stage_is_reported_as_timeout() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let builder = CommandBuilder::new(
        dir.path().to_path_buf(),
        vec![step(BuildStage::Compilation, "sleep 5", 100)],
    );

    let err = with_timeout(builder.build()).await.unwrap_err();

    assert_eq!(err.stage, BuildStage::Timeout);
    assert!(err.stderr.contains("compile"));
}

#[tokio::test]
async fn missing_toolchain_fails_the_stage() {
    let dir = tempfile::tempdir().unwrap();
    let builder = CommandBuilder::new(
        dir.path().to_path_buf(),
        vec![BuildStep {
            stage: BuildStage::DependencyResolution,
            argv: vec!["quorumctl-no-such-toolchain".to_string(), "mod".to_string()],
            timeout: Duration::from_secs(5),
        }],
    );

    let err = with_timeout(builder.build()).await.unwrap_err();
    assert_eq!(err.stage, BuildStage::DependencyResolution);
    assert!(err.stderr.contains("quorumctl-no-such-toolchain"));
}

#[tokio::test]
async fn builder_from_config_runs_configured_commands() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ExperimentConfigBuilder::new()
        .working_dir(dir.path())
        .build_commands(&["sh", "-c", "echo tidy > deps"], &["sh", "-c", "cp deps pbft_main"])
        .build();

    with_timeout(CommandBuilder::from_config(&cfg).build())
        .await
        .unwrap();

    assert!(dir.path().join("pbft_main").is_file());
}

#[tokio::test]
async fn timed_runner_captures_output_and_exit_code() {
    let out = run_with_timeout(&sh("echo out; echo err >&2; exit 4"), None, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(out.code, Some(4));
    assert_eq!(out.stdout, "out\n");
    assert_eq!(out.stderr, "err\n");
    assert!(!out.success());
}

#[tokio::test]
async fn timed_runner_rejects_empty_and_missing_commands() {
    assert!(matches!(
        run_with_timeout(&[], None, Duration::from_secs(1)).await,
        Err(ExecFailure::EmptyCommand)
    ));
    let missing = run_with_timeout(
        &["quorumctl-no-such-binary".to_string()],
        None,
        Duration::from_secs(1),
    )
    .await
    .unwrap_err();
    assert!(missing.is_not_found());
}
