// tests/config_loading.rs

mod common;
use crate::common::ExperimentConfigBuilder;

use std::collections::BTreeSet;
use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use quorumctl::config::validate::{host_without_ssh_port, known_log_files};
use quorumctl::config::{Overrides, load_experiment, load_from_path};
use quorumctl::errors::QuorumError;
use quorumctl::types::{Mode, WorkerExitPolicy};

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn defaults_describe_a_four_node_local_cluster() {
    let file = toml_file("");
    let cfg = load_experiment(Some(file.path()), Overrides::default()).unwrap();

    assert_eq!(cfg.node_count, 4);
    assert_eq!(
        cfg.required_ports,
        BTreeSet::from([20000, 28000, 28100, 28200, 28300])
    );
    let endpoints: Vec<String> = cfg.node_endpoints.iter().map(|e| e.to_string()).collect();
    assert_eq!(
        endpoints,
        vec![
            "127.0.0.1:28000",
            "127.0.0.1:28100",
            "127.0.0.1:28200",
            "127.0.0.1:28300"
        ]
    );
    assert_eq!(cfg.client_endpoint.to_string(), "127.0.0.1:20000");
    assert!(cfg.working_dir.is_absolute());
    assert_eq!(cfg.build.resolve, vec!["go", "mod", "tidy"]);
    assert_eq!(cfg.build.compile_timeout, Duration::from_secs(120));
    assert_eq!(cfg.timings.settle, Duration::from_secs(3));
    assert_eq!(cfg.timings.grace_period, Duration::from_secs(5));
    assert_eq!(cfg.exit_policy, WorkerExitPolicy::Tolerate);
    assert!(cfg.dataset.is_some());
    assert!(cfg.remote.is_none());
}

#[test]
fn known_log_files_follow_launch_order_then_extras() {
    let file = toml_file("");
    let overrides = Overrides {
        node_count: 2,
        ..Overrides::default()
    };
    let cfg = load_experiment(Some(file.path()), overrides).unwrap();

    assert_eq!(
        cfg.known_log_files,
        vec![
            "node_0.log",
            "node_1.log",
            "client.log",
            "blockchain.log",
            "others.log",
            "result.log"
        ]
    );
}

#[test]
fn duplicate_extra_log_files_are_listed_once() {
    let files = known_log_files(1, &["client.log".to_string(), "x.log".to_string()]);
    assert_eq!(files, vec!["node_0.log", "client.log", "x.log"]);
}

#[test]
fn file_values_override_defaults() {
    let file = toml_file(
        r#"
[cluster]
binary = "bin/worker"
client_port = 21000
node_base_port = 30000
node_port_stride = 10
extra_ports = [9999]
worker_exit_policy = "abort"

[timings]
settle_ms = 50
poll_interval_ms = 5

[dataset]
required = false
"#,
    );
    let overrides = Overrides {
        node_count: 3,
        ..Overrides::default()
    };
    let cfg = load_experiment(Some(file.path()), overrides).unwrap();

    assert_eq!(
        cfg.required_ports,
        BTreeSet::from([9999, 21000, 30000, 30010, 30020])
    );
    assert!(cfg.binary_path().ends_with("bin/worker"));
    assert_eq!(cfg.timings.settle, Duration::from_millis(50));
    assert_eq!(cfg.exit_policy, WorkerExitPolicy::Abort);
    assert!(cfg.dataset.is_none());
}

#[test]
fn unknown_keys_are_rejected() {
    let file = toml_file(
        r#"
[cluster]
nodes = 4
"#,
    );
    match load_from_path(file.path()) {
        Err(QuorumError::Toml(_)) => {}
        other => panic!("expected TOML error, got {other:?}"),
    }
}

#[test]
fn missing_explicit_config_is_an_io_error() {
    let result = load_experiment(
        Some(std::path::Path::new("/definitely/not/here/Quorum.toml")),
        Overrides::default(),
    );
    assert!(matches!(result, Err(QuorumError::Io(_))));
}

#[test]
fn node_count_outside_range_is_a_usage_error() {
    for n in [0, 11, 100] {
        match ExperimentConfigBuilder::new().nodes(n).try_build() {
            Err(QuorumError::Usage(msg)) => assert!(msg.contains("between 1 and 10")),
            other => panic!("expected usage error for {n}, got {other:?}"),
        }
    }
    for n in 1..=10 {
        let cfg = ExperimentConfigBuilder::new().nodes(n).build();
        assert_eq!(cfg.node_endpoints.len(), n as usize);
    }
}

#[test]
fn empty_build_command_is_rejected_unless_build_is_skipped() {
    let result = ExperimentConfigBuilder::new()
        .build_commands(&[], &["go", "build"])
        .try_build();
    assert!(matches!(result, Err(QuorumError::Config(_))));

    let cfg = ExperimentConfigBuilder::new()
        .build_commands(&[], &[])
        .skip_build()
        .build();
    assert!(cfg.build.skip);
}

#[test]
fn zero_poll_interval_is_rejected() {
    let result = ExperimentConfigBuilder::new().poll_interval_ms(0).try_build();
    match result {
        Err(QuorumError::Config(msg)) => assert!(msg.contains("poll_interval_ms")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn abort_flag_overrides_file_policy() {
    let cfg = ExperimentConfigBuilder::new()
        .exit_policy(WorkerExitPolicy::Tolerate)
        .abort_on_worker_exit()
        .build();
    assert_eq!(cfg.exit_policy, WorkerExitPolicy::Abort);
}

#[test]
fn remote_mode_requires_remote_section() {
    let result = ExperimentConfigBuilder::new().mode(Mode::Remote).try_build();
    match result {
        Err(QuorumError::Config(msg)) => assert!(msg.contains("[remote]")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn remote_host_count_must_match_node_count() {
    let result = ExperimentConfigBuilder::new()
        .nodes(3)
        .mode(Mode::Remote)
        .remote_hosts(&[(0, "10.0.0.1"), (1, "10.0.0.2")])
        .try_build();
    match result {
        Err(QuorumError::Config(msg)) => assert!(msg.contains("2 hosts for 3 nodes")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn remote_host_ids_must_be_in_range() {
    let result = ExperimentConfigBuilder::new()
        .nodes(2)
        .mode(Mode::Remote)
        .remote_hosts(&[(0, "10.0.0.1"), (5, "10.0.0.2")])
        .try_build();
    assert!(matches!(result, Err(QuorumError::Config(_))));
}

#[test]
fn remote_endpoints_use_mapped_hosts() {
    let cfg = ExperimentConfigBuilder::new()
        .nodes(2)
        .mode(Mode::Remote)
        .remote_hosts(&[(0, "alice@10.0.0.1:2222"), (1, "10.0.0.2")])
        .client_host("10.0.0.9")
        .build();

    assert_eq!(cfg.node_endpoints[0].to_string(), "10.0.0.1:28000");
    assert_eq!(cfg.node_endpoints[1].to_string(), "10.0.0.2:28100");
    assert_eq!(cfg.client_endpoint.to_string(), "10.0.0.9:20000");
    assert_eq!(cfg.remote_host(0), Some("alice@10.0.0.1:2222"));
}

#[test]
fn remote_hosts_in_toml_use_string_keys() {
    let file = toml_file(
        r#"
[remote]
user = "ops"
remote_dir = "/srv/pbft"
hosts = { "0" = "10.0.0.10", "1" = "10.0.0.11" }
"#,
    );
    let overrides = Overrides {
        node_count: 2,
        mode: Mode::Remote,
        ..Overrides::default()
    };
    let cfg = load_experiment(Some(file.path()), overrides).unwrap();
    let remote = cfg.remote.expect("remote settings");
    assert_eq!(remote.hosts.len(), 2);
    assert_eq!(remote.user.as_deref(), Some("ops"));
    assert_eq!(remote.remote_dir, std::path::PathBuf::from("/srv/pbft"));
}

#[test]
fn ssh_port_and_user_are_stripped_from_hosts() {
    assert_eq!(host_without_ssh_port("10.0.0.1"), "10.0.0.1");
    assert_eq!(host_without_ssh_port("10.0.0.1:2222"), "10.0.0.1");
    assert_eq!(host_without_ssh_port("bob@node-a"), "node-a");
    assert_eq!(host_without_ssh_port("bob@node-a:22"), "node-a");
}
