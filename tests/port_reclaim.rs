// tests/port_reclaim.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quorumctl::prep::ports::{
    ChainInspector, InspectError, PortInspector, ProcessKiller, parse_lsof_pids, parse_ss_pids,
};
use quorumctl::prep::{PortClaim, PortReclaimer, PortReservation};
use quorumctl::types::BoxFuture;

/// Inspector backed by a shared port -> pids table.
///
/// Killing a pid removes it from every port unless the port is "stuck".
#[derive(Clone, Default)]
struct FakeInspector {
    table: Arc<Mutex<HashMap<u16, Vec<u32>>>>,
    stuck: Arc<Mutex<BTreeSet<u16>>>,
    unavailable: bool,
    queries: Arc<Mutex<Vec<u16>>>,
}

impl FakeInspector {
    fn bind(&self, port: u16, pid: u32) {
        self.table.lock().unwrap().entry(port).or_default().push(pid);
    }

    fn stick(&self, port: u16) {
        self.stuck.lock().unwrap().insert(port);
    }
}

impl PortInspector for FakeInspector {
    fn name(&self) -> &str {
        "fake"
    }

    fn owners(&self, port: u16) -> BoxFuture<'_, Result<Vec<PortClaim>, InspectError>> {
        Box::pin(async move {
            self.queries.lock().unwrap().push(port);
            if self.unavailable {
                return Err(InspectError::Unavailable("fake".to_string()));
            }
            let pids = self.table.lock().unwrap().get(&port).cloned().unwrap_or_default();
            Ok(pids
                .into_iter()
                .map(|owner_pid| PortClaim { port, owner_pid })
                .collect())
        })
    }
}

#[derive(Clone)]
struct FakeKiller {
    inspector: FakeInspector,
    killed: Arc<Mutex<Vec<u32>>>,
}

impl ProcessKiller for FakeKiller {
    fn kill(&self, pid: u32) -> io::Result<()> {
        self.killed.lock().unwrap().push(pid);
        let stuck = self.inspector.stuck.lock().unwrap().clone();
        let mut table = self.inspector.table.lock().unwrap();
        for (port, pids) in table.iter_mut() {
            if !stuck.contains(port) {
                pids.retain(|p| *p != pid);
            }
        }
        Ok(())
    }
}

fn reclaimer(inspector: &FakeInspector) -> (PortReclaimer, Arc<Mutex<Vec<u32>>>) {
    let killed = Arc::new(Mutex::new(Vec::new()));
    let killer = FakeKiller {
        inspector: inspector.clone(),
        killed: Arc::clone(&killed),
    };
    let reclaimer = PortReclaimer::new(
        Box::new(inspector.clone()),
        Box::new(killer),
        Duration::from_millis(5),
    );
    (reclaimer, killed)
}

fn cluster_ports() -> BTreeSet<u16> {
    BTreeSet::from([20000, 28000, 28100, 28200, 28300])
}

#[test]
fn ss_output_pids_are_extracted_and_deduplicated() {
    let output = "\
tcp LISTEN 0 4096 127.0.0.1:28000 0.0.0.0:* users:((\"pbft_main\",pid=4242,fd=3))
tcp LISTEN 0 4096 [::1]:28000 [::]:* users:((\"pbft_main\",pid=4242,fd=4),(\"other\",pid=17,fd=9))
";
    assert_eq!(parse_ss_pids(output), vec![17, 4242]);
    assert!(parse_ss_pids("").is_empty());
}

#[test]
fn lsof_output_is_one_pid_per_line() {
    assert_eq!(parse_lsof_pids("123\n456\n123\n"), vec![123, 456]);
    assert!(parse_lsof_pids("\n  \n").is_empty());
}

#[tokio::test]
async fn free_ports_need_no_kills() {
    init_tracing();
    let inspector = FakeInspector::default();
    let (reclaimer, killed) = reclaimer(&inspector);

    let freed = with_timeout(reclaimer.reclaim(&cluster_ports())).await.unwrap();

    assert_eq!(freed, 0);
    assert!(killed.lock().unwrap().is_empty());
    assert_eq!(inspector.queries.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn owners_are_killed_and_ports_rechecked() {
    init_tracing();
    let inspector = FakeInspector::default();
    inspector.bind(28000, 111);
    inspector.bind(28100, 222);
    inspector.bind(28100, 333);
    let (reclaimer, killed) = reclaimer(&inspector);

    let freed = with_timeout(reclaimer.reclaim(&cluster_ports())).await.unwrap();

    assert_eq!(freed, 2);
    assert_eq!(*killed.lock().unwrap(), vec![111, 222, 333]);
}

#[tokio::test]
async fn a_port_that_cannot_be_freed_is_not_an_error() {
    init_tracing();
    let inspector = FakeInspector::default();
    inspector.bind(28000, 999);
    inspector.stick(28000);
    inspector.bind(28200, 555);
    let (reclaimer, _killed) = reclaimer(&inspector);

    let freed = with_timeout(reclaimer.reclaim(&cluster_ports())).await.unwrap();

    // 28200 was released, 28000 stayed bound; neither fails the call.
    assert_eq!(freed, 1);
}

#[tokio::test]
async fn own_pid_is_never_killed() {
    init_tracing();
    let inspector = FakeInspector::default();
    inspector.bind(20000, std::process::id());
    let (reclaimer, killed) = reclaimer(&inspector);

    let freed = with_timeout(reclaimer.reclaim(&cluster_ports())).await.unwrap();

    assert_eq!(freed, 0);
    assert!(killed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_inspection_tool_degrades_to_a_no_op() {
    init_tracing();
    let inspector = FakeInspector {
        unavailable: true,
        ..FakeInspector::default()
    };
    let (reclaimer, killed) = reclaimer(&inspector);

    let freed = with_timeout(reclaimer.reclaim(&cluster_ports())).await.unwrap();

    assert_eq!(freed, 0);
    assert!(killed.lock().unwrap().is_empty());
    // Gives up after the first port instead of retrying each one.
    assert_eq!(inspector.queries.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn chain_falls_through_unavailable_inspectors() {
    let missing = FakeInspector {
        unavailable: true,
        ..FakeInspector::default()
    };
    let present = FakeInspector::default();
    present.bind(28000, 77);

    let chain = ChainInspector::new(vec![Box::new(missing.clone()), Box::new(present)]);
    let owners = chain.owners(28000).await.unwrap();

    assert_eq!(owners, vec![PortClaim { port: 28000, owner_pid: 77 }]);
    assert_eq!(missing.queries.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn chain_with_nothing_available_reports_unavailable() {
    let a = FakeInspector {
        unavailable: true,
        ..FakeInspector::default()
    };
    let chain = ChainInspector::new(vec![Box::new(a.clone()), Box::new(a)]);
    assert!(matches!(
        chain.owners(1).await,
        Err(InspectError::Unavailable(_))
    ));
}
