// src/prep/ports.rs

//! Port reservation: find whoever holds the cluster's ports and make them
//! let go.
//!
//! Every failure here is downgraded to a warning. If a port really stays
//! bound, the worker that needs it fails to start and that failure is the
//! one the operator sees.

use std::collections::BTreeSet;
use std::io;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::{ExecFailure, run_with_timeout, signal};
use crate::types::BoxFuture;

/// A process found listening on one of the required ports.
///
/// Only lives for the duration of one cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortClaim {
    pub port: u16,
    pub owner_pid: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InspectError {
    /// The inspection tool is not installed on this host.
    #[error("port inspection tool '{0}' is not available")]
    Unavailable(String),

    #[error("port inspection failed: {0}")]
    Failed(String),
}

/// Platform mechanism that maps a port to the pids bound to it.
pub trait PortInspector: Send + Sync {
    fn name(&self) -> &str;

    fn owners(&self, port: u16) -> BoxFuture<'_, std::result::Result<Vec<PortClaim>, InspectError>>;
}

/// Delivers the termination signal to a port owner.
pub trait ProcessKiller: Send + Sync {
    fn kill(&self, pid: u32) -> io::Result<()>;
}

/// `SIGKILL` via the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalKiller;

impl ProcessKiller for SignalKiller {
    fn kill(&self, pid: u32) -> io::Result<()> {
        signal::kill(pid)
    }
}

/// Contract the supervisor relies on: free what can be freed, report how
/// many ports ended up released, never fail the run.
pub trait PortReservation: Send + Sync {
    fn reclaim<'a>(&'a self, ports: &'a BTreeSet<u16>) -> BoxFuture<'a, Result<usize>>;
}

static SS_PID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"pid=(\d+)").expect("valid regex"));

/// Extract owner pids from `ss -p` output. Header lines are ignored.
pub fn parse_ss_pids(output: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = SS_PID
        .captures_iter(output)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Extract owner pids from `lsof -t` output (one pid per line).
pub fn parse_lsof_pids(output: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

fn claims(port: u16, pids: Vec<u32>) -> Vec<PortClaim> {
    pids.into_iter()
        .map(|owner_pid| PortClaim { port, owner_pid })
        .collect()
}

fn map_exec_failure(tool: &str, err: ExecFailure) -> InspectError {
    if err.is_not_found() {
        InspectError::Unavailable(tool.to_string())
    } else {
        InspectError::Failed(err.to_string())
    }
}

/// `ss -Htulpn "sport = :<port>"`.
#[derive(Debug, Clone)]
pub struct SsInspector {
    pub timeout: Duration,
}

impl PortInspector for SsInspector {
    fn name(&self) -> &str {
        "ss"
    }

    fn owners(&self, port: u16) -> BoxFuture<'_, std::result::Result<Vec<PortClaim>, InspectError>> {
        Box::pin(async move {
            let argv = vec![
                "ss".to_string(),
                "-Htulpn".to_string(),
                format!("sport = :{port}"),
            ];
            let out = run_with_timeout(&argv, None, self.timeout)
                .await
                .map_err(|e| map_exec_failure("ss", e))?;
            if !out.success() {
                return Err(InspectError::Failed(format!(
                    "ss exited with {:?}: {}",
                    out.code,
                    out.stderr.trim()
                )));
            }
            Ok(claims(port, parse_ss_pids(&out.stdout)))
        })
    }
}

/// `lsof -t -i :<port>`. Exit code 1 with no output means "nobody".
#[derive(Debug, Clone)]
pub struct LsofInspector {
    pub timeout: Duration,
}

impl PortInspector for LsofInspector {
    fn name(&self) -> &str {
        "lsof"
    }

    fn owners(&self, port: u16) -> BoxFuture<'_, std::result::Result<Vec<PortClaim>, InspectError>> {
        Box::pin(async move {
            let argv = vec![
                "lsof".to_string(),
                "-t".to_string(),
                "-i".to_string(),
                format!(":{port}"),
            ];
            let out = run_with_timeout(&argv, None, self.timeout)
                .await
                .map_err(|e| map_exec_failure("lsof", e))?;
            match out.code {
                Some(0) => Ok(claims(port, parse_lsof_pids(&out.stdout))),
                Some(1) if out.stdout.trim().is_empty() => Ok(Vec::new()),
                code => Err(InspectError::Failed(format!(
                    "lsof exited with {:?}: {}",
                    code,
                    out.stderr.trim()
                ))),
            }
        })
    }
}

/// Tries each inspector in order, moving on only when one is unavailable.
pub struct ChainInspector {
    inspectors: Vec<Box<dyn PortInspector>>,
}

impl ChainInspector {
    pub fn new(inspectors: Vec<Box<dyn PortInspector>>) -> Self {
        Self { inspectors }
    }

    /// `ss` first, `lsof` as fallback.
    pub fn platform_default(timeout: Duration) -> Self {
        Self::new(vec![
            Box::new(SsInspector { timeout }),
            Box::new(LsofInspector { timeout }),
        ])
    }
}

impl PortInspector for ChainInspector {
    fn name(&self) -> &str {
        "chain"
    }

    fn owners(&self, port: u16) -> BoxFuture<'_, std::result::Result<Vec<PortClaim>, InspectError>> {
        Box::pin(async move {
            let mut tried = Vec::new();
            for inspector in &self.inspectors {
                match inspector.owners(port).await {
                    Err(InspectError::Unavailable(tool)) => {
                        debug!(tool = %tool, "port inspection tool missing; trying next");
                        tried.push(tool);
                    }
                    other => return other,
                }
            }
            Err(InspectError::Unavailable(tried.join(", ")))
        })
    }
}

/// The real PortReservation: inspect, kill, wait, re-check.
pub struct PortReclaimer {
    inspector: Box<dyn PortInspector>,
    killer: Box<dyn ProcessKiller>,
    recheck_delay: Duration,
    own_pid: u32,
}

impl PortReclaimer {
    pub fn new(
        inspector: Box<dyn PortInspector>,
        killer: Box<dyn ProcessKiller>,
        recheck_delay: Duration,
    ) -> Self {
        Self {
            inspector,
            killer,
            recheck_delay,
            own_pid: std::process::id(),
        }
    }

    pub fn platform_default(inspect_timeout: Duration, recheck_delay: Duration) -> Self {
        Self::new(
            Box::new(ChainInspector::platform_default(inspect_timeout)),
            Box::new(SignalKiller),
            recheck_delay,
        )
    }

    async fn reclaim_inner(&self, ports: &BTreeSet<u16>) -> usize {
        let mut signalled: Vec<u16> = Vec::new();

        for &port in ports {
            let owners = match self.inspector.owners(port).await {
                Ok(owners) => owners,
                Err(InspectError::Unavailable(tool)) => {
                    warn!(
                        tools = %tool,
                        "no port inspection tool available; skipping port cleanup"
                    );
                    return 0;
                }
                Err(InspectError::Failed(msg)) => {
                    warn!(port, error = %msg, "could not inspect port; leaving it alone");
                    continue;
                }
            };

            if owners.is_empty() {
                debug!(port, "port is free");
                continue;
            }

            for claim in owners {
                if claim.owner_pid == self.own_pid {
                    warn!(port, "port is held by quorumctl itself; not killing");
                    continue;
                }
                info!(port, pid = claim.owner_pid, "killing process holding port");
                if let Err(e) = self.killer.kill(claim.owner_pid) {
                    warn!(port, pid = claim.owner_pid, error = %e, "failed to kill port owner");
                }
            }
            signalled.push(port);
        }

        if signalled.is_empty() {
            return 0;
        }

        tokio::time::sleep(self.recheck_delay).await;

        let mut freed = 0;
        for port in signalled {
            match self.inspector.owners(port).await {
                Ok(owners) if owners.is_empty() => {
                    info!(port, "port released");
                    freed += 1;
                }
                Ok(owners) => {
                    let pids: Vec<u32> = owners.iter().map(|c| c.owner_pid).collect();
                    warn!(port, ?pids, "port still bound after cleanup; continuing anyway");
                }
                Err(e) => {
                    warn!(port, error = %e, "could not re-check port; continuing anyway");
                }
            }
        }
        freed
    }
}

impl PortReservation for PortReclaimer {
    fn reclaim<'a>(&'a self, ports: &'a BTreeSet<u16>) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            info!(?ports, inspector = self.inspector.name(), "reclaiming cluster ports");
            let freed = self.reclaim_inner(ports).await;
            info!(freed, "port cleanup completed");
            Ok(freed)
        })
    }
}
