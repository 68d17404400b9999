// src/supervisor/shutdown.rs

//! Shutdown barrier: every live worker is asked to stop at once, then the
//! barrier waits for all of them (bounded by the grace period) before
//! escalating to a forced kill.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::registry::{ProcessRegistry, WorkerSummary};

/// Upper bound on one poll sleep while waiting for exits.
pub const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// How long to wait for the OS to reap force-killed processes.
pub const REAP_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownOutcome {
    /// Workers sent a graceful termination request.
    pub asked: usize,
    /// Workers still alive after the grace period.
    pub forced_kills: usize,
    /// Handles confirmed terminated and removed from the registry.
    pub workers: Vec<WorkerSummary>,
    /// Handles that could not be confirmed terminated.
    pub remaining: usize,
}

/// Stop everything in `registry`.
///
/// Safe to call repeatedly; an empty registry returns an empty outcome.
pub async fn shutdown_barrier(registry: &mut ProcessRegistry, grace: Duration) -> ShutdownOutcome {
    registry.poll_all();

    let asked = registry.request_termination_all().len();
    if asked > 0 {
        info!(workers = asked, grace_ms = grace.as_millis() as u64, "requested graceful termination");
    }

    let deadline = Instant::now() + grace;
    wait_until_idle(registry, deadline).await;

    let mut forced_kills = 0;
    if registry.live_count() > 0 {
        let killed = registry.force_kill_live();
        forced_kills = killed.len();
        for key in &killed {
            warn!(worker = %key, "did not stop within grace period; killed");
        }
        wait_until_idle(registry, Instant::now() + REAP_WINDOW).await;
    }

    let workers = registry.drain_terminated();
    let remaining = registry.len();
    if remaining > 0 {
        warn!(remaining, "some workers could not be confirmed terminated");
    }
    debug!(asked, forced_kills, reaped = workers.len(), remaining, "shutdown barrier done");

    ShutdownOutcome {
        asked,
        forced_kills,
        workers,
        remaining,
    }
}

async fn wait_until_idle(registry: &mut ProcessRegistry, deadline: Instant) {
    loop {
        registry.poll_all();
        if registry.live_count() == 0 {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        sleep(SHUTDOWN_POLL.min(deadline - now)).await;
    }
}
