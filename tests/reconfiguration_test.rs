// tests/reconfiguration_test.rs
//
// Drives a Reconfigurator and one or more ActiveReplica nodes over real
// TCP sockets (core::net::TcpMessenger / run_listener), the same way a
// deployed RC and its ARs would talk to each other. No mocked
// messenger here: these exercise the wire codec, the listener dispatch
// tables, and the retransmitting task scheduler's retry behavior all at
// once.

use gns_core::core::ar::{self, ActiveReplica, EpochInstance, EpochStatus, IntraGroupCoordinator, LocalCoordinator};
use gns_core::core::demand::NullDemandProfile;
use gns_core::core::messenger::PeerMessenger;
use gns_core::core::net::{TcpMessenger, run_listener};
use gns_core::core::protocol::{NodeId, ReplicaAddr};
use gns_core::core::rc::demand::DemandAggregator;
use gns_core::core::rc::log::{ControlLog, InMemoryControlLog};
use gns_core::core::rc::store::{InMemoryRecordStore, RecordStore};
use gns_core::core::rc::{self, Reconfigurator};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn spawn_ar(
    id: &str,
    addr: SocketAddr,
    book: HashMap<NodeId, SocketAddr>,
) -> Arc<ActiveReplica<LocalCoordinator, TcpMessenger>> {
    let messenger = Arc::new(TcpMessenger::new(book));
    let coordinator = Arc::new(LocalCoordinator::new());
    let active_replica = Arc::new(ActiveReplica::new(NodeId::new(id), coordinator, messenger));
    let dispatch_target = active_replica.clone();
    tokio::spawn(async move {
        run_listener(addr, move |envelope| {
            let active_replica = dispatch_target.clone();
            async move { ar::listener::dispatch(active_replica, envelope).await }
        })
        .await
        .ok();
    });
    active_replica
}

fn spawn_rc(
    id: &str,
    addr: SocketAddr,
    book: HashMap<NodeId, SocketAddr>,
) -> Arc<Reconfigurator<InMemoryControlLog, InMemoryRecordStore, TcpMessenger>> {
    let messenger = Arc::new(TcpMessenger::new(book));
    let reconfigurator = Arc::new(Reconfigurator::new(
        NodeId::new(id),
        Arc::new(InMemoryControlLog::new()),
        Arc::new(InMemoryRecordStore::new()),
        messenger.clone(),
    ));
    let aggregator = Arc::new(DemandAggregator::new(NullDemandProfile));
    let address_book: Arc<HashMap<NodeId, ReplicaAddr>> = Arc::new(HashMap::new());
    let decode_profile: Arc<dyn Fn(&[u8]) + Send + Sync> = Arc::new(|_: &[u8]| ());
    let dispatch_target = reconfigurator.clone();
    tokio::spawn(async move {
        run_listener(addr, move |envelope| {
            let reconfigurator = dispatch_target.clone();
            let messenger = messenger.clone();
            let address_book = address_book.clone();
            let aggregator = aggregator.clone();
            let decode_profile = decode_profile.clone();
            async move {
                rc::listener::dispatch(reconfigurator, messenger, address_book, aggregator, decode_profile, envelope)
                    .await
            }
        })
        .await
        .ok();
    });
    reconfigurator
}

async fn wait_until_ready<L, S, M>(rc: &Reconfigurator<L, S, M>, name: &str) -> rc::ReconfigurationRecord
where
    L: ControlLog + 'static,
    S: RecordStore + 'static,
    M: PeerMessenger + 'static,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(record) = rc.record(name).await {
                if record.is_ready() {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("record did not reach READY in time")
}

async fn wait_until_deleted<L, S, M>(rc: &Reconfigurator<L, S, M>, name: &str)
where
    L: ControlLog + 'static,
    S: RecordStore + 'static,
    M: PeerMessenger + 'static,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if rc.record(name).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("record was not deleted in time")
}

async fn wait_for_status<C, M>(ar: &ActiveReplica<C, M>, name: &str, epoch: u32, want: EpochStatus) -> EpochInstance
where
    C: IntraGroupCoordinator + 'static,
    M: PeerMessenger + 'static,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(instance) = ar.instance(name, epoch) {
                if instance.status == want {
                    return instance;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("instance for {name}@{epoch} never reached {want:?}"))
}

#[tokio::test]
async fn single_node_creation_reaches_ready() {
    let rc_id = NodeId::new("rc-1");
    let ar_id = NodeId::new("ar-1");
    let rc_addr = free_addr().await;
    let ar_addr = free_addr().await;

    let book = HashMap::from([(rc_id.clone(), rc_addr), (ar_id.clone(), ar_addr)]);

    let ar1 = spawn_ar("ar-1", ar_addr, book.clone()).await;
    let rc1 = spawn_rc("rc-1", rc_addr, book);

    rc1.create("svc-a".into(), b"v0".to_vec(), vec![ar_id.clone()])
        .await
        .unwrap();

    let record = wait_until_ready(&rc1, "svc-a").await;
    assert_eq!(record.epoch, 0);
    assert_eq!(record.actives, vec![ar_id]);

    let instance = wait_for_status(&ar1, "svc-a", 0, EpochStatus::Running).await;
    assert_eq!(instance.members.len(), 1);
}

#[tokio::test]
async fn change_replicas_moves_group_and_drops_old_epoch() {
    let rc_id = NodeId::new("rc-1");
    let a = NodeId::new("ar-a");
    let b = NodeId::new("ar-b");
    let c = NodeId::new("ar-c");
    let d = NodeId::new("ar-d");

    let rc_addr = free_addr().await;
    let a_addr = free_addr().await;
    let b_addr = free_addr().await;
    let c_addr = free_addr().await;
    let d_addr = free_addr().await;

    let book = HashMap::from([
        (rc_id.clone(), rc_addr),
        (a.clone(), a_addr),
        (b.clone(), b_addr),
        (c.clone(), c_addr),
        (d.clone(), d_addr),
    ]);

    let ar_a = spawn_ar("ar-a", a_addr, book.clone()).await;
    spawn_ar("ar-b", b_addr, book.clone()).await;
    spawn_ar("ar-c", c_addr, book.clone()).await;
    let ar_d = spawn_ar("ar-d", d_addr, book.clone()).await;
    let rc1 = spawn_rc("rc-1", rc_addr, book);

    rc1.create("svc-b".into(), b"v0".to_vec(), vec![a.clone(), b.clone(), c.clone()])
        .await
        .unwrap();
    wait_until_ready(&rc1, "svc-b").await;

    rc1.change_replicas("svc-b", Some(vec![b.clone(), c.clone(), d.clone()]))
        .await
        .unwrap();

    let record = wait_until_ready(&rc1, "svc-b").await;
    assert_eq!(record.epoch, 1);
    assert_eq!(record.actives, vec![b, c, d]);

    wait_for_status(&ar_d, "svc-b", 1, EpochStatus::Running).await;
    wait_for_status(&ar_a, "svc-b", 0, EpochStatus::Dropped).await;
}

#[tokio::test]
async fn delete_removes_record_after_full_drop_ack_cycle() {
    let rc_id = NodeId::new("rc-1");
    let ar_id = NodeId::new("ar-1");
    let rc_addr = free_addr().await;
    let ar_addr = free_addr().await;

    let book = HashMap::from([(rc_id.clone(), rc_addr), (ar_id.clone(), ar_addr)]);

    let ar1 = spawn_ar("ar-1", ar_addr, book.clone()).await;
    let rc1 = spawn_rc("rc-1", rc_addr, book);

    rc1.create("svc-c".into(), b"v0".to_vec(), vec![ar_id])
        .await
        .unwrap();
    wait_until_ready(&rc1, "svc-c").await;

    rc1.change_replicas("svc-c", None).await.unwrap();
    wait_until_deleted(&rc1, "svc-c").await;

    let instance = wait_for_status(&ar1, "svc-c", 0, EpochStatus::Dropped).await;
    assert!(instance.final_checkpoint.is_none());
}
