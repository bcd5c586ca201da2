use std::{
    net::{IpAddr, Ipv4Addr},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use assert_matches::assert_matches;
use bzz_hive::{
    DialError, Hive, HiveConfig, HiveError, Peer, PeerConnection, SendError, SyncState,
    decode_sync,
};
use bzz_kademlia::{KademliaConfig, KnownNode, Node, NodeRecord, load_file};
use bzz_net_hive::{HiveMessage, PeerAddr, PeerListResponse, ProbeRequest};
use bzz_primitives::{Address, NodeId, unix_millis};
use parking_lot::Mutex;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("bzz_hive=trace,bzz_kademlia=trace")
        .with_test_writer()
        .try_init();
}

struct MockConnection {
    remote: PeerAddr,
    observed: IpAddr,
    sent: Mutex<Vec<HiveMessage>>,
    closed: AtomicBool,
}

impl MockConnection {
    fn sent(&self) -> Vec<HiveMessage> {
        self.sent.lock().clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl PeerConnection for MockConnection {
    fn remote(&self) -> &PeerAddr {
        &self.remote
    }

    fn observed_ip(&self) -> IpAddr {
        self.observed
    }

    fn send(&self, msg: HiveMessage) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        self.sent.lock().push(msg);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// Address in bin `po` of the zero address, distinguished by `tag`.
fn addr_in_bin(po: usize, tag: u8) -> Address {
    let mut bytes = [0u8; 32];
    bytes[po / 8] = 0x80 >> (po % 8);
    bytes[31] = tag;
    Address::from(bytes)
}

fn public_ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(81, 2, 69, last))
}

fn peer_addr(overlay: Address, ip: IpAddr) -> PeerAddr {
    PeerAddr::new(overlay, NodeId::repeat_byte(overlay[31]), ip, 30399)
}

fn connect_peer(overlay: Address) -> (Arc<MockConnection>, Arc<Peer>) {
    let ip = public_ip(overlay[31]);
    let conn = Arc::new(MockConnection {
        remote: peer_addr(overlay, ip),
        observed: ip,
        sent: Mutex::new(Vec::new()),
        closed: AtomicBool::new(false),
    });
    let peer = Arc::new(Peer::new(conn.clone()));
    (conn, peer)
}

fn config(bucket_size: usize) -> HiveConfig {
    HiveConfig::default().with_kademlia(KademliaConfig::default().with_bucket_size(bucket_size))
}

/// Retry delays of one millisecond, so records become dialable again almost
/// immediately in wall-clock time.
fn fast_retry(bucket_size: usize) -> KademliaConfig {
    KademliaConfig::default()
        .with_bucket_size(bucket_size)
        .with_initial_retry_interval(Duration::ZERO)
        .with_max_retry_interval(Duration::ZERO)
}

fn offline_record(hive: &Hive, addr: Address) -> NodeRecord {
    match hive.get_peers(addr.as_slice(), 1).into_iter().next() {
        Some(KnownNode::Offline(record)) if record.addr == addr => record,
        other => panic!("expected offline record for {addr}, got {other:?}"),
    }
}

type Dials = Arc<Mutex<Vec<String>>>;

fn start(hive: &Arc<Hive>) -> Dials {
    let dials: Dials = Arc::default();
    let recorded = Arc::clone(&dials);
    hive.start(
        NodeId::ZERO,
        || "127.0.0.1:30399".to_string(),
        move |url: &str| -> Result<(), DialError> {
            recorded.lock().push(url.to_string());
            Ok(())
        },
    )
    .unwrap();
    dials
}

#[tokio::test]
async fn lifecycle_errors() {
    init_tracing();
    let hive = Arc::new(Hive::new(Address::ZERO, config(4)));
    let (_, peer) = connect_peer(addr_in_bin(0, 1));

    assert_matches!(hive.add_peer(Arc::clone(&peer)), Err(HiveError::NotRunning));
    assert_matches!(hive.stop().await, Err(HiveError::NotRunning));

    start(&hive);
    assert!(hive.is_running());
    assert_matches!(
        hive.start(NodeId::ZERO, String::new, |_: &str| Ok(())),
        Err(HiveError::AlreadyRunning)
    );

    assert_eq!(hive.stop().await.unwrap(), 0);
    assert!(!hive.is_running());
    assert_matches!(hive.stop().await, Err(HiveError::NotRunning));
}

#[tokio::test]
async fn add_peer_sends_hello_and_drops_evicted() {
    init_tracing();
    let hive = Arc::new(Hive::new(Address::ZERO, config(1)));
    start(&hive);

    let (first_conn, first) = connect_peer(addr_in_bin(2, 1));
    hive.add_peer(Arc::clone(&first)).unwrap();
    assert_eq!(hive.count(), 1);
    assert_eq!(first_conn.sent().first(), Some(&HiveMessage::Probe(ProbeRequest::hello())));

    let (second_conn, second) = connect_peer(addr_in_bin(2, 2));
    hive.add_peer(Arc::clone(&second)).unwrap();

    assert!(first_conn.is_closed());
    assert!(!second_conn.is_closed());
    assert_eq!(hive.count(), 1);
    assert_eq!(hive.db_count(), 1);

    hive.stop().await.unwrap();
}

#[tokio::test]
async fn add_peer_rejects_own_address() {
    init_tracing();
    let own = addr_in_bin(0, 7);
    let hive = Arc::new(Hive::new(own, config(4)));
    start(&hive);

    let (_, me) = connect_peer(own);
    assert_matches!(hive.add_peer(me), Err(HiveError::Kademlia(_)));
    assert_eq!(hive.count(), 0);

    hive.stop().await.unwrap();
}

#[tokio::test]
async fn spoofed_entry_dropped_rest_of_batch_added() {
    init_tracing();
    let hive = Arc::new(Hive::new(Address::ZERO, config(4)));
    start(&hive);

    let (_, sender) = connect_peer(addr_in_bin(1, 1));
    hive.add_peer(Arc::clone(&sender)).unwrap();

    let spoofed = peer_addr(addr_in_bin(3, 1), IpAddr::V4(Ipv4Addr::LOCALHOST));
    let valid = peer_addr(addr_in_bin(3, 2), public_ip(200));
    let msg =
        PeerListResponse { peers: vec![spoofed.clone(), valid.clone()], ..Default::default() };

    assert_eq!(hive.handle_peers_msg(&msg, &sender), 1);

    let known: Vec<Address> =
        hive.get_peers(valid.overlay.as_slice(), 0).iter().map(Node::addr).collect();
    assert!(known.contains(&valid.overlay));
    assert!(!known.contains(&spoofed.overlay));

    hive.stop().await.unwrap();
}

#[tokio::test]
async fn custom_relay_check() {
    init_tracing();
    let hive = Arc::new(Hive::new(Address::ZERO, config(4)).with_relay_check(|_, _| Ok(())));
    start(&hive);

    let (_, sender) = connect_peer(addr_in_bin(1, 1));
    let local = peer_addr(addr_in_bin(3, 1), IpAddr::V4(Ipv4Addr::LOCALHOST));
    let msg = PeerListResponse { peers: vec![local], ..Default::default() };
    assert_eq!(hive.handle_peers_msg(&msg, &sender), 1);

    hive.stop().await.unwrap();
}

#[tokio::test]
async fn expired_probe_gets_no_answer() {
    init_tracing();
    let hive = Arc::new(Hive::new(Address::ZERO, config(4)));
    let (_, requester) = connect_peer(addr_in_bin(0, 1));

    let req = ProbeRequest::lookup(addr_in_bin(2, 9), 5, 77).with_deadline(unix_millis() - 1_000);
    assert!(hive.peers(&req, &requester).is_none());

    let deadline = unix_millis() + 60_000;
    let resp = hive.peers(&req.clone().with_deadline(deadline), &requester).unwrap();
    assert_eq!(resp.id, 77);
    assert_eq!(resp.deadline, Some(deadline));
    assert_eq!(resp.key, Some(addr_in_bin(2, 9)));
}

#[tokio::test]
async fn probe_answer_excludes_requester() {
    init_tracing();
    let hive = Arc::new(Hive::new(Address::ZERO, config(4)));
    start(&hive);

    let (_, requester) = connect_peer(addr_in_bin(4, 1));
    let (_, other) = connect_peer(addr_in_bin(4, 2));
    hive.add_peer(Arc::clone(&requester)).unwrap();
    hive.add_peer(Arc::clone(&other)).unwrap();

    let gossip = PeerListResponse {
        peers: (10..20).map(|tag| peer_addr(addr_in_bin(5, tag), public_ip(tag))).collect(),
        ..Default::default()
    };
    assert_eq!(hive.handle_peers_msg(&gossip, &other), 10);

    let resp = hive.peers(&ProbeRequest::hello(), &requester).unwrap();
    assert_eq!(resp.key, None);
    assert_eq!(resp.peers.len(), 11);
    assert!(resp.peers.iter().all(|p| p.overlay != requester.addr()));
    // closest to the requester first
    assert_eq!(resp.peers[0].overlay, other.addr());

    let limited = hive.peers(&ProbeRequest::lookup(addr_in_bin(5, 10), 3, 1), &requester).unwrap();
    assert_eq!(limited.peers.len(), 3);
    assert_eq!(limited.peers[0].overlay, addr_in_bin(5, 10));
    assert_eq!(limited.peers[0], peer_addr(addr_in_bin(5, 10), public_ip(10)));

    hive.stop().await.unwrap();
}

#[tokio::test]
async fn handle_message_answers_probe() {
    init_tracing();
    let hive = Arc::new(Hive::new(Address::ZERO, config(4)));
    start(&hive);

    let (conn, peer) = connect_peer(addr_in_bin(0, 1));
    let (_, other) = connect_peer(addr_in_bin(1, 1));
    hive.add_peer(Arc::clone(&peer)).unwrap();
    hive.add_peer(Arc::clone(&other)).unwrap();

    hive.handle_message(ProbeRequest::lookup(addr_in_bin(1, 1), 0, 5).into(), &peer);

    let answered = conn.sent().into_iter().find_map(|msg| match msg {
        HiveMessage::Peers(resp) if resp.id == 5 => Some(resp),
        _ => None,
    });
    let resp = answered.unwrap();
    assert_eq!(resp.peers.first().map(|p| p.overlay), Some(other.addr()));

    hive.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn probe_loop_dials_learned_peers() {
    init_tracing();
    let hive = Arc::new(Hive::new(Address::ZERO, config(4)));
    let dials = start(&hive);

    let (_, sender) = connect_peer(addr_in_bin(0, 1));
    hive.add_peer(Arc::clone(&sender)).unwrap();

    let learned = peer_addr(addr_in_bin(2, 5), public_ip(5));
    let msg = PeerListResponse { peers: vec![learned.clone()], ..Default::default() };
    assert_eq!(hive.handle_peers_msg(&msg, &sender), 1);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(dials.lock().contains(&learned.url()));

    hive.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn probe_loop_asks_connected_peer_for_more() {
    init_tracing();
    let hive = Arc::new(Hive::new(Address::ZERO, config(4)));
    start(&hive);

    let (conn, peer) = connect_peer(addr_in_bin(0, 1));
    hive.add_peer(peer).unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    let lookups: Vec<ProbeRequest> = conn
        .sent()
        .into_iter()
        .filter_map(|msg| match msg {
            HiveMessage::Probe(req) if !req.is_self_lookup() => Some(req),
            _ => None,
        })
        .collect();
    assert!(!lookups.is_empty());
    assert_eq!(lookups[0].max_peers, 30);

    hive.stop().await.unwrap();
}

#[tokio::test]
async fn drop_all_closes_connections() {
    init_tracing();
    let hive = Arc::new(Hive::new(Address::ZERO, config(4)));
    start(&hive);

    let conns: Vec<Arc<MockConnection>> = (1..=3)
        .map(|tag| {
            let (conn, peer) = connect_peer(addr_in_bin(usize::from(tag), tag));
            hive.add_peer(peer).unwrap();
            conn
        })
        .collect();

    hive.drop_all();
    assert!(conns.iter().all(|c| c.is_closed()));

    hive.stop().await.unwrap();
}

#[tokio::test]
async fn stop_persists_sync_state() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut cfg = config(4);
    cfg.init_path(dir.path());
    let path = cfg.persist_path.clone().unwrap();

    let hive = Arc::new(Hive::new(Address::ZERO, cfg.clone()));
    start(&hive);

    let (_, peer) = connect_peer(addr_in_bin(3, 1));
    hive.add_peer(Arc::clone(&peer)).unwrap();
    let state = SyncState { first: 4, last: 9, session_at: 1234, ..Default::default() };
    peer.set_sync_state(state.clone());

    assert_eq!(hive.stop().await.unwrap(), 1);

    let records = load_file(&path).unwrap();
    assert_eq!(records.len(), 1);
    let meta = records[0].meta.as_ref().unwrap();
    assert_eq!(decode_sync(meta).unwrap(), state);

    // a restarted hive restores the record and hands the state back on reconnect
    let restarted = Arc::new(Hive::new(Address::ZERO, cfg));
    start(&restarted);
    assert_eq!(restarted.db_count(), 1);

    let (_, again) = connect_peer(addr_in_bin(3, 1));
    restarted.add_peer(Arc::clone(&again)).unwrap();
    assert_eq!(again.sync_state(), state);

    restarted.stop().await.unwrap();
}

#[tokio::test]
async fn remove_peer_after_stop_is_noop() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut cfg = config(4);
    cfg.init_path(dir.path());
    let path = cfg.persist_path.clone().unwrap();

    let hive = Arc::new(Hive::new(Address::ZERO, cfg));
    start(&hive);

    let (_, peer) = connect_peer(addr_in_bin(1, 1));
    hive.add_peer(Arc::clone(&peer)).unwrap();
    hive.stop().await.unwrap();
    let saved = load_file(&path).unwrap();

    let before = offline_record(&hive, peer.addr());

    hive.remove_peer(&peer);
    assert_eq!(hive.count(), 0);
    assert_eq!(offline_record(&hive, peer.addr()), before);
    assert_eq!(hive.handle_peers_msg(&PeerListResponse::default(), &peer), 0);
    assert_eq!(load_file(&path).unwrap(), saved);
}

#[tokio::test]
async fn remove_peer_keeps_record() {
    init_tracing();
    let hive = Arc::new(Hive::new(Address::ZERO, config(4)));
    start(&hive);

    let (_, peer) = connect_peer(addr_in_bin(6, 1));
    hive.add_peer(Arc::clone(&peer)).unwrap();
    hive.remove_peer(&peer);

    assert_eq!(hive.count(), 0);
    assert_eq!(hive.db_count(), 1);
    let known = hive.get_peers(peer.addr().as_slice(), 1);
    assert_eq!(known.len(), 1);
    assert!(!known[0].is_connected());
    assert!(hive.status().contains("connected: 0, known: 1"));

    hive.stop().await.unwrap();
}

#[tokio::test]
async fn evicted_peer_sync_state_persisted() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut cfg = config(1);
    cfg.init_path(dir.path());
    let path = cfg.persist_path.clone().unwrap();

    let hive = Arc::new(Hive::new(Address::ZERO, cfg));
    start(&hive);

    let (a_conn, a) = connect_peer(addr_in_bin(2, 1));
    hive.add_peer(Arc::clone(&a)).unwrap();
    let state = SyncState { first: 7, last: 99, ..Default::default() };
    a.set_sync_state(state.clone());

    let (_, b) = connect_peer(addr_in_bin(2, 2));
    hive.add_peer(Arc::clone(&b)).unwrap();
    assert!(a_conn.is_closed());

    // the transport reports the evicted connection closed
    hive.remove_peer(&a);
    assert_eq!(hive.stop().await.unwrap(), 2);

    let records = load_file(&path).unwrap();
    let saved = records.iter().find(|r| r.addr == a.addr()).unwrap();
    assert_eq!(decode_sync(saved.meta.as_ref().unwrap()).unwrap(), state);
}

#[tokio::test(start_paused = true)]
async fn restart_redials_peers_connected_at_stop() {
    init_tracing();
    let hive = Arc::new(Hive::new(Address::ZERO, config(4).with_kademlia(fast_retry(4))));
    start(&hive);

    let (conn, peer) = connect_peer(addr_in_bin(1, 1));
    hive.add_peer(Arc::clone(&peer)).unwrap();
    hive.stop().await.unwrap();

    assert!(conn.is_closed());
    assert_eq!(hive.count(), 0);
    assert_eq!(hive.db_count(), 1);

    std::thread::sleep(Duration::from_millis(5));
    let dials = start(&hive);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(hive.count(), 0);
    assert_eq!(*dials.lock(), vec![peer.url()]);

    hive.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn maintenance_ticks_retry_until_saturated() {
    init_tracing();
    // two bins of one slot each
    let kademlia = fast_retry(1).with_max_prox(1);
    let hive = Arc::new(Hive::new(Address::ZERO, config(1).with_kademlia(kademlia)));
    let dials = start(&hive);
    let interval = hive.config().call_interval;

    let (_, sender) = connect_peer(addr_in_bin(0, 1));
    hive.add_peer(Arc::clone(&sender)).unwrap();
    let learned = peer_addr(addr_in_bin(1, 5), public_ip(5));
    let msg = PeerListResponse { peers: vec![learned.clone()], ..Default::default() };
    assert_eq!(hive.handle_peers_msg(&msg, &sender), 1);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(dials.lock().len(), 1);

    // the dial never connected; only the next tick retries it
    std::thread::sleep(Duration::from_millis(5));
    tokio::time::sleep(interval / 2).await;
    assert_eq!(dials.lock().len(), 1);
    tokio::time::sleep(interval).await;
    assert_eq!(*dials.lock(), vec![learned.url(), learned.url()]);

    // both bins full: ticks stop waking the probe loop
    let (_, connected) = connect_peer(learned.overlay);
    hive.add_peer(Arc::clone(&connected)).unwrap();
    let extra = peer_addr(addr_in_bin(2, 6), public_ip(6));
    let msg = PeerListResponse { peers: vec![extra.clone()], ..Default::default() };
    assert_eq!(hive.handle_peers_msg(&msg, &sender), 1);

    std::thread::sleep(Duration::from_millis(5));
    tokio::time::sleep(interval * 3).await;
    assert_eq!(dials.lock().len(), 2);

    // a disconnect re-arms the scheduler and frees the bin again
    hive.remove_peer(&connected);
    std::thread::sleep(Duration::from_millis(5));
    tokio::time::sleep(interval * 2).await;
    assert!(dials.lock().len() > 2);
    assert!(dials.lock()[2..].iter().all(|url| *url == extra.url() || *url == learned.url()));

    hive.stop().await.unwrap();
}
