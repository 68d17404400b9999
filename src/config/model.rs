// src/config/model.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{Endpoint, Mode, WorkerExitPolicy};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [cluster]
/// binary = "pbft_main"
/// log_dir = "logs"
///
/// [build]
/// compile = ["go", "build", "-o", "pbft_main", "main.go"]
///
/// [timings]
/// settle_ms = 3000
///
/// [remote]
/// user = "wucy"
/// remote_dir = "/opt/pbft"
/// hosts = { "0" = "10.0.0.10", "1" = "10.0.0.11:2222" }
/// ```
///
/// Every section is optional; defaults reproduce a four-node local cluster.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawExperimentFile {
    #[serde(default)]
    pub cluster: ClusterSection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub timings: TimingsSection,

    #[serde(default)]
    pub dataset: DatasetSection,

    /// Only consulted in remote mode.
    #[serde(default)]
    pub remote: Option<RemoteSection>,
}

/// `[cluster]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterSection {
    /// Directory the worker binary runs in (and where `log_dir` lives).
    pub working_dir: PathBuf,

    /// Worker executable, relative to `working_dir`.
    pub binary: PathBuf,

    /// Log directory, relative to `working_dir`.
    pub log_dir: PathBuf,

    pub client_port: u16,
    pub node_base_port: u16,
    pub node_port_stride: u16,

    /// Ports to reclaim in addition to the ones derived from the endpoints.
    pub extra_ports: Vec<u16>,

    /// Appended verbatim to every worker command line.
    pub extra_args: Vec<String>,

    /// Log files to clear in addition to `node_<id>.log` / `client.log`.
    pub extra_log_files: Vec<String>,

    pub worker_exit_policy: WorkerExitPolicy,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            binary: PathBuf::from("pbft_main"),
            log_dir: PathBuf::from("logs"),
            client_port: 20000,
            node_base_port: 28000,
            node_port_stride: 100,
            extra_ports: Vec::new(),
            extra_args: Vec::new(),
            extra_log_files: vec![
                "blockchain.log".to_string(),
                "others.log".to_string(),
                "result.log".to_string(),
            ],
            worker_exit_policy: WorkerExitPolicy::Tolerate,
        }
    }
}

/// `[build]` section. Commands are argv vectors, not shell strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
    pub resolve: Vec<String>,
    pub compile: Vec<String>,
    pub toolchain_probe: Vec<String>,
    pub resolve_timeout_secs: u64,
    pub compile_timeout_secs: u64,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            resolve: argv(&["go", "mod", "tidy"]),
            compile: argv(&["go", "build", "-o", "pbft_main", "main.go"]),
            toolchain_probe: argv(&["go", "version"]),
            resolve_timeout_secs: 60,
            compile_timeout_secs: 120,
        }
    }
}

/// `[timings]` section, all values in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingsSection {
    pub port_recheck_ms: u64,
    pub node_launch_gap_ms: u64,
    pub settle_ms: u64,
    pub poll_interval_ms: u64,
    pub grace_period_ms: u64,
    pub inspect_timeout_ms: u64,
}

impl Default for TimingsSection {
    fn default() -> Self {
        Self {
            port_recheck_ms: 2000,
            node_launch_gap_ms: 1000,
            settle_ms: 3000,
            poll_interval_ms: 1000,
            grace_period_ms: 5000,
            inspect_timeout_ms: 10_000,
        }
    }
}

/// `[dataset]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetSection {
    /// `false` skips the presence check entirely.
    pub required: bool,
    /// Relative to `working_dir`.
    pub path: PathBuf,
    pub source_url: Option<String>,
}

impl Default for DatasetSection {
    fn default() -> Self {
        Self {
            required: true,
            path: PathBuf::from("data/len3_data.csv"),
            source_url: Some(
                "https://drive.google.com/file/d/1gIBGcneoUz9jaU48PYCjP6xjWegRlgE-/view"
                    .to_string(),
            ),
        }
    }
}

/// `[remote]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteSection {
    /// Node id (as a string key, TOML tables can't have integer keys) to
    /// `host` or `host:ssh_port`.
    #[serde(default)]
    pub hosts: BTreeMap<String, String>,

    /// Where the client runs. Absent: the client runs on this machine.
    #[serde(default)]
    pub client_host: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    /// Project directory on the remote hosts. Defaults to `working_dir`.
    #[serde(default)]
    pub remote_dir: Option<PathBuf>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Values that come from the command line rather than the file.
#[derive(Debug, Clone, Copy)]
pub struct Overrides {
    pub node_count: u32,
    pub mode: Mode,
    pub skip_build: bool,
    pub abort_on_worker_exit: bool,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            node_count: 4,
            mode: Mode::Headless,
            skip_build: false,
            abort_on_worker_exit: false,
        }
    }
}

/// Validated, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub node_count: u32,
    pub mode: Mode,
    pub working_dir: PathBuf,
    pub binary: PathBuf,
    pub log_dir: PathBuf,
    pub known_log_files: Vec<String>,
    pub required_ports: BTreeSet<u16>,
    /// Index = node id.
    pub node_endpoints: Vec<Endpoint>,
    pub client_endpoint: Endpoint,
    pub extra_args: Vec<String>,
    pub build: BuildSettings,
    pub timings: Timings,
    pub dataset: Option<DatasetSettings>,
    pub remote: Option<RemoteSettings>,
    pub exit_policy: WorkerExitPolicy,
}

impl ExperimentConfig {
    pub fn binary_path(&self) -> PathBuf {
        self.working_dir.join(&self.binary)
    }

    pub fn log_dir_path(&self) -> PathBuf {
        self.working_dir.join(&self.log_dir)
    }

    pub fn node_endpoint(&self, id: u32) -> Option<&Endpoint> {
        self.node_endpoints.get(id as usize)
    }

    /// Node id -> host address; only populated in remote mode.
    pub fn remote_host(&self, id: u32) -> Option<&str> {
        self.remote
            .as_ref()
            .and_then(|r| r.hosts.get(&id))
            .map(|s| s.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub skip: bool,
    pub resolve: Vec<String>,
    pub compile: Vec<String>,
    pub toolchain_probe: Vec<String>,
    pub resolve_timeout: Duration,
    pub compile_timeout: Duration,
}

/// Every intentional sleep and timeout of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub port_recheck: Duration,
    pub node_launch_gap: Duration,
    pub settle: Duration,
    pub poll_interval: Duration,
    pub grace_period: Duration,
    pub inspect_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Timings::from(&TimingsSection::default())
    }
}

impl From<&TimingsSection> for Timings {
    fn from(raw: &TimingsSection) -> Self {
        Self {
            port_recheck: Duration::from_millis(raw.port_recheck_ms),
            node_launch_gap: Duration::from_millis(raw.node_launch_gap_ms),
            settle: Duration::from_millis(raw.settle_ms),
            poll_interval: Duration::from_millis(raw.poll_interval_ms),
            grace_period: Duration::from_millis(raw.grace_period_ms),
            inspect_timeout: Duration::from_millis(raw.inspect_timeout_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetSettings {
    pub path: PathBuf,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub hosts: BTreeMap<u32, String>,
    pub client_host: Option<String>,
    pub user: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub remote_dir: PathBuf,
}
