#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use quorumctl::config::model::{RemoteSection, TimingsSection};
use quorumctl::config::{ExperimentConfig, Overrides, RawExperimentFile};
use quorumctl::errors::Result;
use quorumctl::types::{Mode, WorkerExitPolicy};

/// Builder for `ExperimentConfig` to simplify test setup.
///
/// Starts from the production defaults with two changes: every timing is
/// shrunk to milliseconds and the dataset check is off.
pub struct ExperimentConfigBuilder {
    raw: RawExperimentFile,
    overrides: Overrides,
}

impl ExperimentConfigBuilder {
    pub fn new() -> Self {
        let mut raw = RawExperimentFile::default();
        raw.timings = fast_timings();
        raw.dataset.required = false;
        Self {
            raw,
            overrides: Overrides::default(),
        }
    }

    pub fn nodes(mut self, n: u32) -> Self {
        self.overrides.node_count = n;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.overrides.mode = mode;
        self
    }

    pub fn skip_build(mut self) -> Self {
        self.overrides.skip_build = true;
        self
    }

    pub fn abort_on_worker_exit(mut self) -> Self {
        self.overrides.abort_on_worker_exit = true;
        self
    }

    pub fn exit_policy(mut self, policy: WorkerExitPolicy) -> Self {
        self.raw.cluster.worker_exit_policy = policy;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw.cluster.working_dir = dir.into();
        self
    }

    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.raw.cluster.binary = binary.into();
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw.cluster.log_dir = dir.into();
        self
    }

    pub fn extra_args(mut self, args: &[&str]) -> Self {
        self.raw.cluster.extra_args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn dataset(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw.dataset.required = true;
        self.raw.dataset.path = path.into();
        self
    }

    pub fn build_commands(mut self, resolve: &[&str], compile: &[&str]) -> Self {
        self.raw.build.resolve = resolve.iter().map(|s| s.to_string()).collect();
        self.raw.build.compile = compile.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn remote_hosts(mut self, hosts: &[(u32, &str)]) -> Self {
        let section = self.raw.remote.get_or_insert_with(RemoteSection::default);
        section.hosts = hosts
            .iter()
            .map(|(id, host)| (id.to_string(), host.to_string()))
            .collect::<BTreeMap<_, _>>();
        self
    }

    pub fn remote_user(mut self, user: &str) -> Self {
        self.raw
            .remote
            .get_or_insert_with(RemoteSection::default)
            .user = Some(user.to_string());
        self
    }

    pub fn remote_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw
            .remote
            .get_or_insert_with(RemoteSection::default)
            .remote_dir = Some(dir.into());
        self
    }

    pub fn client_host(mut self, host: &str) -> Self {
        self.raw
            .remote
            .get_or_insert_with(RemoteSection::default)
            .client_host = Some(host.to_string());
        self
    }

    pub fn node_launch_gap_ms(mut self, ms: u64) -> Self {
        self.raw.timings.node_launch_gap_ms = ms;
        self
    }

    pub fn settle_ms(mut self, ms: u64) -> Self {
        self.raw.timings.settle_ms = ms;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.raw.timings.poll_interval_ms = ms;
        self
    }

    pub fn grace_period_ms(mut self, ms: u64) -> Self {
        self.raw.timings.grace_period_ms = ms;
        self
    }

    pub fn try_build(self) -> Result<ExperimentConfig> {
        ExperimentConfig::try_from((self.raw, self.overrides))
    }

    pub fn build(self) -> ExperimentConfig {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ExperimentConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn fast_timings() -> TimingsSection {
    TimingsSection {
        port_recheck_ms: 5,
        node_launch_gap_ms: 10,
        settle_ms: 30,
        poll_interval_ms: 10,
        grace_period_ms: 200,
        inspect_timeout_ms: 1_000,
    }
}
