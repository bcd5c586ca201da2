use std::{fmt, net::IpAddr, sync::Arc};

use bzz_kademlia::{Kademlia, KnownNode, Node, NodeRecord, save_file};
use bzz_net_hive::{HiveMessage, PeerAddr, PeerListResponse, ProbeRequest};
use bzz_primitives::{Address, NodeId, address_from_key, random_address_at, unix_millis};
use parking_lot::Mutex;
use tokio::{
    sync::{Notify, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use crate::{
    DialError, HiveConfig, HiveError, Peer, RelayIpError, Scheduler, check_relay_ip,
    load_sync, metrics::HiveMetrics, save_sync,
};

/// Validates an address relayed by a peer: `(observed sender ip, claimed ip)`.
pub type RelayCheck = Arc<dyn Fn(IpAddr, IpAddr) -> Result<(), RelayIpError> + Send + Sync>;

type ConnectFn = dyn Fn(&str) -> Result<(), DialError> + Send + Sync;

enum Phase {
    Stopped,
    Running { shutdown: watch::Sender<bool>, tasks: Vec<JoinHandle<()>> },
}

impl Phase {
    fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

struct State {
    kad: Kademlia<Peer>,
    scheduler: Scheduler,
    phase: Phase,
}

/// Keeps the routing table populated.
///
/// The hive registers connections reported by the transport, answers and
/// issues peer-exchange probes, and runs two background tasks while started:
/// - **probe loop**: on every wake, asks the table for a dial candidate and,
///   if a bin is under-populated, probes a connected peer for more addresses
/// - **maintenance**: ticks every `call_interval` and wakes the probe loop
///   while the scheduler is armed and offline candidates exist
///
/// All table, scheduler and lifecycle state sits behind one mutex. Wakes are
/// delivered through a [`Notify`] permit, so bursts of events coalesce into a
/// single probe round.
pub struct Hive {
    own: Address,
    config: HiveConfig,
    state: Mutex<State>,
    wake: Notify,
    relay_check: RelayCheck,
    metrics: HiveMetrics,
}

impl fmt::Debug for Hive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Hive")
            .field("own", &self.own)
            .field("running", &state.phase.is_running())
            .field("armed", &state.scheduler.is_armed())
            .field("connected", &state.kad.count())
            .finish_non_exhaustive()
    }
}

impl Hive {
    pub fn new(own: Address, config: HiveConfig) -> Self {
        let state = State {
            kad: Kademlia::new(own, config.kademlia.clone()),
            scheduler: Scheduler::new(config.call_interval),
            phase: Phase::Stopped,
        };
        Self {
            own,
            config,
            state: Mutex::new(state),
            wake: Notify::new(),
            relay_check: Arc::new(check_relay_ip),
            metrics: HiveMetrics::default(),
        }
    }

    /// Replace the relayed-address validation.
    pub fn with_relay_check<F>(mut self, check: F) -> Self
    where
        F: Fn(IpAddr, IpAddr) -> Result<(), RelayIpError> + Send + Sync + 'static,
    {
        self.relay_check = Arc::new(check);
        self
    }

    pub fn address(&self) -> Address {
        self.own
    }

    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().phase.is_running()
    }

    /// Connected peer count.
    pub fn count(&self) -> usize {
        self.state.lock().kad.count()
    }

    /// Known-offline peer count.
    pub fn db_count(&self) -> usize {
        self.state.lock().kad.db_count()
    }

    /// Start maintaining the routing table.
    ///
    /// Restores persisted node records (failures are logged), then spawns the
    /// probe loop and the maintenance task on the current tokio runtime.
    /// `connect` is asked to dial suggested nodes and must not block.
    pub fn start<L, C>(
        self: &Arc<Self>,
        id: NodeId,
        listen_addr: L,
        connect: C,
    ) -> Result<(), HiveError>
    where
        L: Fn() -> String,
        C: Fn(&str) -> Result<(), DialError> + Send + Sync + 'static,
    {
        {
            let mut state = self.state.lock();
            if state.phase.is_running() {
                return Err(HiveError::AlreadyRunning);
            }

            if let Some(path) = &self.config.persist_path {
                match state.kad.load(path, None) {
                    Ok(loaded) => debug!(loaded, path = %path.display(), "restored node records"),
                    Err(e) => {
                        warn!(error = %e, path = %path.display(), "failed to restore node records")
                    }
                }
            }
            state.scheduler.arm();

            let (shutdown, rx) = watch::channel(false);
            let connect: Arc<ConnectFn> = Arc::new(connect);
            let tasks = vec![
                tokio::spawn(Arc::clone(self).probe_loop(connect, rx.clone())),
                tokio::spawn(Arc::clone(self).maintenance_loop(rx)),
            ];
            state.phase = Phase::Running { shutdown, tasks };
        }

        info!(node_id = %id, overlay = %self.own, listen_addr = %listen_addr(), "hive started");
        self.record_population();
        self.wake.notify_one();
        Ok(())
    }

    /// Stop the background tasks and persist the routing table.
    ///
    /// Returns once both tasks have exited, so no dial is requested after
    /// this resolves. Connected peers are demoted to known-offline and their
    /// connections closed, so a restart dials them afresh. Returns the number
    /// of records saved.
    pub async fn stop(&self) -> Result<usize, HiveError> {
        let (shutdown, tasks) = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut state.phase, Phase::Stopped) {
                Phase::Running { shutdown, tasks } => (shutdown, tasks),
                Phase::Stopped => return Err(HiveError::NotRunning),
            }
        };

        let _ = shutdown.send(true);
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "hive task failed");
            }
        }

        let (snapshot, connected) = {
            let mut state = self.state.lock();
            state.scheduler.disarm();
            let snapshot = self.config.persist_path.clone().map(|path| {
                let mut hook = save_sync;
                (path, state.kad.snapshot(Some(&mut hook)))
            });
            (snapshot, state.kad.disconnect_all())
        };
        for peer in connected {
            peer.disconnect();
        }
        self.record_population();

        let Some((path, records)) = snapshot else {
            info!("hive stopped");
            return Ok(0);
        };
        let saved = records.len();
        let path = tokio::task::spawn_blocking(move || save_file(&path, &records).map(|()| path))
            .await??;
        info!(saved, path = %path.display(), "hive stopped");
        Ok(saved)
    }

    /// Register a handshaked connection.
    ///
    /// Restores the peer's sync state, drops whichever peer it evicted and
    /// greets it with an empty probe.
    pub fn add_peer(&self, peer: Arc<Peer>) -> Result<(), HiveError> {
        let evicted = {
            let mut state = self.state.lock();
            if !state.phase.is_running() {
                return Err(HiveError::NotRunning);
            }
            let evicted = state.kad.on(Arc::clone(&peer), load_sync)?;
            if let Some(evicted) = &evicted {
                state.kad.save_node(evicted, save_sync);
            }
            evicted
        };
        debug!(%peer, "peer added");

        if let Some(evicted) = evicted {
            debug!(peer = %evicted, "dropping evicted peer");
            evicted.disconnect();
        }
        if let Err(e) = peer.send_probe(ProbeRequest::hello()) {
            debug!(%peer, error = %e, "failed to send hello probe");
        }

        self.record_population();
        self.wake.notify_one();
        Ok(())
    }

    /// Deregister a closed connection. Ignored once the hive is stopped.
    pub fn remove_peer(&self, peer: &Arc<Peer>) {
        {
            let mut state = self.state.lock();
            if !state.phase.is_running() {
                trace!(%peer, "hive stopped, ignoring disconnect");
                return;
            }
            if !state.kad.off(peer, save_sync) {
                return;
            }
            state.scheduler.arm();
        }
        debug!(%peer, "peer removed");

        self.record_population();
        self.wake.notify_one();
    }

    /// Known nodes closest to `key`. `max == 0` returns all.
    pub fn get_peers(&self, key: &[u8], max: usize) -> Vec<KnownNode<Peer>> {
        self.state.lock().kad.find_closest(&address_from_key(key), max)
    }

    /// Disconnect every connected peer.
    pub fn drop_all(&self) {
        let peers = self.state.lock().kad.find_closest_connected(&self.own, 0);
        debug!(count = peers.len(), "dropping all peers");
        for peer in peers {
            peer.disconnect();
        }
    }

    /// Merge a peer list received from `from`, returning how many entries were new.
    ///
    /// Entries whose address fails the relay check are dropped individually.
    pub fn handle_peers_msg(&self, msg: &PeerListResponse, from: &Peer) -> usize {
        from.touch();
        let observed = from.observed_ip();

        let records: Vec<NodeRecord> = msg
            .peers
            .iter()
            .filter_map(|entry| match (self.relay_check)(observed, entry.ip) {
                Ok(()) => Some(NodeRecord::new(entry.overlay, entry.url())),
                Err(e) => {
                    let peer = entry.overlay;
                    trace!(%from, %peer, ip = %entry.ip, error = %e, "dropping peer");
                    self.metrics.peers_rejected_total.increment(1);
                    None
                }
            })
            .collect();

        let added = {
            let mut state = self.state.lock();
            if !state.phase.is_running() {
                return 0;
            }
            state.kad.add(records)
        };
        trace!(%from, received = msg.len(), added, "handled peer list");

        if added > 0 {
            self.metrics.peers_learned_total.increment(added as u64);
            self.record_population();
            self.wake.notify_one();
        }
        added
    }

    /// Answer a probe from `from`. Expired probes get no answer.
    pub fn peers(&self, req: &ProbeRequest, from: &Peer) -> Option<PeerListResponse> {
        if req.is_expired(unix_millis()) {
            trace!(%from, id = req.id, "dropping expired probe");
            return None;
        }

        let requester = from.addr();
        let (key, echo) =
            if req.is_self_lookup() { (requester, None) } else { (req.key, Some(req.key)) };
        let limit = self.config.max_peers_per_response;
        let max = match req.max_peers as usize {
            0 => limit,
            n => n.min(limit),
        };

        // one extra in case the requester is among the closest
        let closest = self.state.lock().kad.find_closest(&key, max + 1);
        let peers: Vec<PeerAddr> = closest
            .iter()
            .filter(|node| node.addr() != requester)
            .filter_map(peer_addr)
            .take(max)
            .collect();
        trace!(%from, id = req.id, count = peers.len(), "answering probe");

        Some(PeerListResponse { peers, key: echo, id: req.id, deadline: req.deadline })
    }

    /// Dispatch an inbound hive message from `from`.
    pub fn handle_message(&self, msg: HiveMessage, from: &Peer) {
        from.touch();
        match msg {
            HiveMessage::Probe(req) => {
                if let Some(resp) = self.peers(&req, from) {
                    if let Err(e) = from.send_peers(resp) {
                        debug!(%from, error = %e, "failed to send peer list");
                    }
                }
            }
            HiveMessage::Peers(resp) => {
                self.handle_peers_msg(&resp, from);
            }
        }
    }

    /// Routing table rendering.
    pub fn status(&self) -> String {
        self.state.lock().kad.to_string()
    }

    async fn probe_loop(
        self: Arc<Self>,
        connect: Arc<ConnectFn>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = self.wake.notified() => {}
            }
            if !self.probe(&*connect) {
                break;
            }
        }
        trace!("probe loop exited");
    }

    /// One probe round. Returns false once the hive has stopped.
    fn probe(&self, connect: &ConnectFn) -> bool {
        let (suggestion, messenger, status) = {
            let mut state = self.state.lock();
            if !state.phase.is_running() {
                return false;
            }
            let suggestion = state.kad.suggest();
            let messenger = suggestion.need_more.then(|| {
                let target = random_address_at(&self.own, suggestion.prox_limit as usize);
                let peer = state.kad.find_closest_connected(&target, 1).into_iter().next();
                (target, peer)
            });
            state.scheduler.set_need(suggestion.need_more);
            (suggestion, messenger, state.kad.status_line())
        };

        if let Some(candidate) = &suggestion.candidate {
            debug!(peer = %candidate.addr, url = %candidate.url, "dialing");
            self.metrics.dials_total.increment(1);
            if let Err(e) = connect(&candidate.url) {
                debug!(peer = %candidate.addr, error = %e, "dial failed");
                self.metrics.dial_errors_total.increment(1);
            }
        }

        match messenger {
            Some((target, Some(peer))) => {
                let req = ProbeRequest::lookup(
                    target,
                    self.config.max_peers_per_response as u32,
                    rand::random(),
                );
                trace!(%peer, prox_limit = suggestion.prox_limit, "probing for peers");
                match peer.send_probe(req) {
                    Ok(()) => self.metrics.probes_sent_total.increment(1),
                    Err(e) => debug!(%peer, error = %e, "failed to send probe"),
                }
            }
            Some((_, None)) => debug!(prox_limit = suggestion.prox_limit, "no peer to probe"),
            None => {}
        }

        self.record_population();
        debug!(need_more = suggestion.need_more, bins = %status, "hive population");
        true
    }

    async fn maintenance_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.call_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            let fire = {
                let mut state = self.state.lock();
                if !state.phase.is_running() {
                    break;
                }
                let has_candidates = state.kad.db_count() > 0;
                state.scheduler.should_fire(Instant::now(), has_candidates)
            };
            if fire {
                trace!("maintenance tick, waking probe loop");
                self.wake.notify_one();
            }
        }
        trace!("maintenance loop exited");
    }

    fn record_population(&self) {
        let (connected, offline) = {
            let state = self.state.lock();
            (state.kad.count(), state.kad.db_count())
        };
        self.metrics.record_population(connected, offline);
    }
}

impl fmt::Display for Hive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.status())
    }
}

fn peer_addr(node: &KnownNode<Peer>) -> Option<PeerAddr> {
    match node {
        KnownNode::Connected(peer) => Some(peer.remote().clone()),
        KnownNode::Offline(record) => match PeerAddr::from_url(record.addr, &record.url) {
            Ok(addr) => Some(addr),
            Err(e) => {
                trace!(peer = %record.addr, url = %record.url, error = %e, "bad record url");
                None
            }
        },
    }
}
