// src/config/validate.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::config::model::{
    BuildSettings, DatasetSettings, ExperimentConfig, Overrides, RawExperimentFile,
    RemoteSection, RemoteSettings, Timings,
};
use crate::errors::{QuorumError, Result};
use crate::types::{Endpoint, Mode, WorkerExitPolicy};

pub const MIN_NODES: u32 = 1;
pub const MAX_NODES: u32 = 10;

const LOCAL_HOST: &str = "127.0.0.1";

impl TryFrom<(RawExperimentFile, Overrides)> for ExperimentConfig {
    type Error = QuorumError;

    fn try_from(
        (raw, overrides): (RawExperimentFile, Overrides),
    ) -> std::result::Result<Self, Self::Error> {
        validate_node_count(overrides.node_count)?;
        validate_build(&raw, overrides.skip_build)?;
        validate_timings(&raw)?;

        let remote = match overrides.mode {
            Mode::Remote => Some(remote_settings(&raw, overrides.node_count)?),
            Mode::Local | Mode::Headless => None,
        };

        let node_endpoints = node_endpoints(&raw, overrides.node_count, remote.as_ref())?;
        let client_endpoint = Endpoint {
            host: remote
                .as_ref()
                .and_then(|r| r.client_host.as_deref())
                .map(host_without_ssh_port)
                .unwrap_or(LOCAL_HOST)
                .to_string(),
            port: raw.cluster.client_port,
        };

        let mut required_ports: BTreeSet<u16> = node_endpoints.iter().map(|e| e.port).collect();
        required_ports.insert(client_endpoint.port);
        required_ports.extend(raw.cluster.extra_ports.iter().copied());

        let exit_policy = if overrides.abort_on_worker_exit {
            WorkerExitPolicy::Abort
        } else {
            raw.cluster.worker_exit_policy
        };

        let dataset = raw.dataset.required.then(|| DatasetSettings {
            path: raw.dataset.path.clone(),
            source_url: raw.dataset.source_url.clone(),
        });

        Ok(ExperimentConfig {
            node_count: overrides.node_count,
            mode: overrides.mode,
            known_log_files: known_log_files(overrides.node_count, &raw.cluster.extra_log_files),
            working_dir: raw.cluster.working_dir,
            binary: raw.cluster.binary,
            log_dir: raw.cluster.log_dir,
            required_ports,
            node_endpoints,
            client_endpoint,
            extra_args: raw.cluster.extra_args,
            build: BuildSettings {
                skip: overrides.skip_build,
                resolve: raw.build.resolve,
                compile: raw.build.compile,
                toolchain_probe: raw.build.toolchain_probe,
                resolve_timeout: std::time::Duration::from_secs(raw.build.resolve_timeout_secs),
                compile_timeout: std::time::Duration::from_secs(raw.build.compile_timeout_secs),
            },
            timings: Timings::from(&raw.timings),
            dataset,
            remote,
            exit_policy,
        })
    }
}

fn validate_node_count(node_count: u32) -> Result<()> {
    if !(MIN_NODES..=MAX_NODES).contains(&node_count) {
        return Err(QuorumError::Usage(format!(
            "node count must be between {MIN_NODES} and {MAX_NODES} (got {node_count})"
        )));
    }
    Ok(())
}

fn validate_build(raw: &RawExperimentFile, skip_build: bool) -> Result<()> {
    if skip_build {
        return Ok(());
    }
    if raw.build.resolve.is_empty() || raw.build.compile.is_empty() {
        return Err(QuorumError::Config(
            "[build].resolve and [build].compile must be non-empty argv lists".to_string(),
        ));
    }
    if raw.build.resolve_timeout_secs == 0 || raw.build.compile_timeout_secs == 0 {
        return Err(QuorumError::Config(
            "[build] stage timeouts must be >= 1 second".to_string(),
        ));
    }
    Ok(())
}

fn validate_timings(raw: &RawExperimentFile) -> Result<()> {
    if raw.timings.poll_interval_ms == 0 {
        return Err(QuorumError::Config(
            "[timings].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.timings.inspect_timeout_ms == 0 {
        return Err(QuorumError::Config(
            "[timings].inspect_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

/// The host map must cover exactly the node ids `0..node_count`.
fn remote_settings(raw: &RawExperimentFile, node_count: u32) -> Result<RemoteSettings> {
    let section: &RemoteSection = raw.remote.as_ref().ok_or_else(|| {
        QuorumError::Config("remote mode requires a [remote] section".to_string())
    })?;

    let mut hosts = BTreeMap::new();
    for (key, host) in section.hosts.iter() {
        let id: u32 = key.trim().parse().map_err(|_| {
            QuorumError::Config(format!("[remote].hosts key '{key}' is not a node id"))
        })?;
        if host.trim().is_empty() {
            return Err(QuorumError::Config(format!(
                "[remote].hosts entry for node {id} is empty"
            )));
        }
        if id >= node_count {
            return Err(QuorumError::Config(format!(
                "[remote].hosts has node {id} but only {node_count} nodes were requested"
            )));
        }
        hosts.insert(id, host.trim().to_string());
    }

    if hosts.len() != node_count as usize {
        return Err(QuorumError::Config(format!(
            "remote mode needs one host per node: {} hosts for {} nodes",
            hosts.len(),
            node_count
        )));
    }

    Ok(RemoteSettings {
        hosts,
        client_host: section.client_host.clone(),
        user: section.user.clone(),
        identity_file: section.identity_file.clone(),
        remote_dir: section
            .remote_dir
            .clone()
            .unwrap_or_else(|| raw.cluster.working_dir.clone()),
    })
}

fn node_endpoints(
    raw: &RawExperimentFile,
    node_count: u32,
    remote: Option<&RemoteSettings>,
) -> Result<Vec<Endpoint>> {
    let mut endpoints = Vec::with_capacity(node_count as usize);
    for id in 0..node_count {
        let offset = u32::from(raw.cluster.node_port_stride) * id;
        let port = u32::from(raw.cluster.node_base_port) + offset;
        let port = u16::try_from(port).map_err(|_| {
            QuorumError::Config(format!("port for node {id} overflows ({port})"))
        })?;
        let host = remote
            .and_then(|r| r.hosts.get(&id))
            .map(|h| host_without_ssh_port(h).to_string())
            .unwrap_or_else(|| LOCAL_HOST.to_string());
        endpoints.push(Endpoint { host, port });
    }
    Ok(endpoints)
}

/// `user@host:2222` -> `host`.
pub fn host_without_ssh_port(address: &str) -> &str {
    let without_user = address.rsplit_once('@').map(|(_, h)| h).unwrap_or(address);
    match without_user.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => without_user,
    }
}

/// Per-role log files in launch order, followed by configured extras.
pub fn known_log_files(node_count: u32, extras: &[String]) -> Vec<String> {
    let mut files: Vec<String> = (0..node_count).map(|id| format!("node_{id}.log")).collect();
    files.push("client.log".to_string());
    for extra in extras {
        if !files.contains(extra) {
            files.push(extra.clone());
        }
    }
    files
}
