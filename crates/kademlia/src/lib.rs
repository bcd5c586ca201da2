//! Proximity-bucketed Kademlia routing table for the bzz overlay.
//!
//! # Architecture
//!
//! The table keeps two views of the network, both binned by proximity order
//! (PO) to the local address:
//! - **buckets**: bounded sets of connected nodes ([`Bucket`]), one per PO
//! - **node db**: a [`NodeRecord`] for every node ever seen ([`NodeDb`]),
//!   connected or not, persisted to disk between runs
//!
//! A node connecting to a full bucket evicts the least recently active
//! connection of that bin. Evicted and disconnected nodes remain in the db as
//! known-offline records and are offered again by [`Kademlia::suggest`] once
//! their retry backoff has expired.
//!
//! The table is a plain data structure: it performs no I/O except in
//! [`Kademlia::load`] and [`Kademlia::save`], and callers provide their own
//! locking.
//!
//! # Usage
//!
//! ```ignore
//! use bzz_kademlia::{Kademlia, KademliaConfig};
//!
//! let mut kad = Kademlia::new(own_address, KademliaConfig::default());
//! kad.load(&path, None)?;
//!
//! if let Some(evicted) = kad.on(peer, |_record, _peer| Ok(()))? {
//!     evicted.disconnect();
//! }
//!
//! let suggestion = kad.suggest();
//! ```

mod bucket;
mod config;
mod db;
mod error;
mod node;
mod record;

pub use bucket::Bucket;
pub use config::{
    DEFAULT_BUCKET_SIZE, DEFAULT_CONN_RETRY_EXP, DEFAULT_INITIAL_RETRY_INTERVAL,
    DEFAULT_MAX_PROX, DEFAULT_MAX_RETRY_INTERVAL, DEFAULT_PURGE_INTERVAL, KademliaConfig,
};
pub use db::{NodeDb, load_file, save_file};
pub use error::{HookError, KademliaError};
pub use node::{KnownNode, Node};
pub use record::NodeRecord;

use std::{collections::HashSet, fmt, path::Path, sync::Arc};

use bzz_primitives::{Address, Proximity, distance_cmp, unix_millis};
use tracing::{debug, trace, warn};

/// Hook applied to each persisted record on load. An error skips the record.
pub type LoadHook<'a> = &'a mut dyn FnMut(&mut NodeRecord) -> Result<(), HookError>;

/// Hook snapshotting a connected node's state into its record on save.
pub type SaveHook<'a, N> = &'a mut dyn FnMut(&mut NodeRecord, &N);

/// Outcome of [`Kademlia::suggest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// Known-offline node worth dialing now.
    pub candidate: Option<NodeRecord>,
    /// Some bin has fewer connections than the bucket size.
    pub need_more: bool,
    /// Shallowest under-populated bin, or `max_prox` when all are full.
    pub prox_limit: u8,
}

/// Kademlia routing table over connected nodes of type `N`.
pub struct Kademlia<N> {
    own: Address,
    config: KademliaConfig,
    buckets: Vec<Bucket<N>>,
    db: NodeDb,
}

impl<N> fmt::Debug for Kademlia<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kademlia")
            .field("own", &self.own)
            .field("known", &self.db.len())
            .finish_non_exhaustive()
    }
}

impl<N: Node> Kademlia<N> {
    /// Create an empty table for the local address `own`.
    pub fn new(own: Address, config: KademliaConfig) -> Self {
        let bins = config.num_bins();
        let buckets = (0..bins).map(|_| Bucket::new(config.bucket_size)).collect();
        Self { own, config, buckets, db: NodeDb::new(bins) }
    }

    pub fn own_address(&self) -> Address {
        self.own
    }

    pub fn config(&self) -> &KademliaConfig {
        &self.config
    }

    /// Bin index of `addr`: its proximity order to the local address, capped at `max_prox`.
    pub fn proximity(&self, addr: &Address) -> u8 {
        self.own.proximity_with_limit(addr, self.config.max_prox)
    }

    /// Register a new connection.
    ///
    /// If a record for the node already exists, `load_sync` restores the
    /// node's state from it first; a hook error aborts the registration.
    /// Returns the node evicted from a full bucket, which the caller should
    /// disconnect.
    pub fn on<F>(&mut self, node: Arc<N>, load_sync: F) -> Result<Option<Arc<N>>, KademliaError>
    where
        F: FnOnce(&NodeRecord, &N) -> Result<(), HookError>,
    {
        let addr = node.addr();
        if addr == self.own {
            return Err(KademliaError::InvalidNode { addr, reason: "own address" });
        }
        let url = node.url();
        if url.is_empty() {
            return Err(KademliaError::InvalidNode { addr, reason: "empty url" });
        }

        if let Some(record) = self.db.get(&addr) {
            load_sync(record, &*node).map_err(|source| KademliaError::SyncHook { addr, source })?;
        }

        let po = self.proximity(&addr) as usize;
        let Some(bucket) = self.buckets.get_mut(po) else {
            return Err(KademliaError::InvalidNode { addr, reason: "proximity out of range" });
        };

        let now = unix_millis();
        match self.db.get_mut(&addr) {
            Some(record) => {
                record.url = url;
                record.seen = now;
                record.after = now;
            }
            None => {
                self.db.insert_if_absent(
                    po,
                    NodeRecord { addr, url, seen: now, after: now, meta: None },
                );
            }
        }

        if bucket.remove_addr(&addr).is_some() {
            debug!(%addr, po, "replacing stale connection");
        }
        let evicted = bucket.insert(node);

        if let Some(evicted) = &evicted {
            let evicted_addr = evicted.addr();
            if let Some(record) = self.db.get_mut(&evicted_addr) {
                record.mark_offline(&self.config, now);
            }
            debug!(%addr, evicted = %evicted_addr, po, "bucket full, evicted least active");
        } else {
            trace!(%addr, po, "node connected");
        }

        Ok(evicted)
    }

    /// Deregister a connection.
    ///
    /// `save_sync` snapshots the node's state into its record. Returns false
    /// (and leaves the record alone) if this instance is not the connected one.
    pub fn off<F>(&mut self, node: &Arc<N>, save_sync: F) -> bool
    where
        F: FnOnce(&mut NodeRecord, &N),
    {
        let addr = node.addr();
        let po = self.proximity(&addr) as usize;
        let removed = self.buckets.get_mut(po).is_some_and(|bucket| bucket.remove(node));
        if !removed {
            trace!(%addr, po, "ignoring disconnect of stale instance");
            return false;
        }

        if let Some(record) = self.db.get_mut(&addr) {
            save_sync(record, &**node);
            record.mark_offline(&self.config, unix_millis());
        }
        trace!(%addr, po, "node disconnected");
        true
    }

    /// Snapshot a node's state into its record without deregistering it.
    ///
    /// Meant for nodes evicted by [`Kademlia::on`]: their later disconnect no
    /// longer matches a bucket entry, so [`Kademlia::off`] ignores it. Returns
    /// false if no record exists for the node.
    pub fn save_node<F>(&mut self, node: &N, save_sync: F) -> bool
    where
        F: FnOnce(&mut NodeRecord, &N),
    {
        match self.db.get_mut(&node.addr()) {
            Some(record) => {
                save_sync(record, node);
                true
            }
            None => false,
        }
    }

    /// Deregister every connection, demoting the nodes to known-offline.
    ///
    /// Returns the removed nodes so the caller can close them.
    pub fn disconnect_all(&mut self) -> Vec<Arc<N>> {
        let now = unix_millis();
        let nodes: Vec<Arc<N>> = self.buckets.iter_mut().flat_map(Bucket::drain).collect();
        for node in &nodes {
            if let Some(record) = self.db.get_mut(&node.addr()) {
                record.mark_offline(&self.config, now);
            }
        }
        debug!(count = nodes.len(), "disconnected all nodes");
        nodes
    }

    /// Merge records learned from gossip as known-offline nodes.
    ///
    /// Records for the local address or for already known nodes are skipped.
    pub fn add(&mut self, records: impl IntoIterator<Item = NodeRecord>) -> usize {
        let mut added = 0;
        for record in records {
            if record.addr == self.own {
                continue;
            }
            let po = self.proximity(&record.addr) as usize;
            if self.db.insert_if_absent(po, record) {
                added += 1;
            }
        }
        added
    }

    /// Nodes closest to `target`, connected or not, nearest first.
    ///
    /// `max == 0` returns every known node.
    pub fn find_closest(&self, target: &Address, max: usize) -> Vec<KnownNode<N>> {
        let connected: HashSet<Address> = self.connected().map(|n| n.addr()).collect();
        let mut nodes: Vec<KnownNode<N>> = self
            .connected()
            .map(|n| KnownNode::Connected(Arc::clone(n)))
            .chain(
                self.db
                    .records()
                    .filter(|r| !connected.contains(&r.addr))
                    .map(|r| KnownNode::Offline(r.clone())),
            )
            .collect();

        nodes.sort_by(|a, b| {
            distance_cmp(target, &a.addr(), &b.addr())
                .reverse()
                .then_with(|| b.last_active().cmp(&a.last_active()))
        });
        if max > 0 {
            nodes.truncate(max);
        }
        nodes
    }

    /// Connected nodes closest to `target`, nearest first. `max == 0` returns all.
    pub fn find_closest_connected(&self, target: &Address, max: usize) -> Vec<Arc<N>> {
        let mut nodes: Vec<Arc<N>> = self.connected().cloned().collect();
        nodes.sort_by(|a, b| distance_cmp(target, &a.addr(), &b.addr()).reverse());
        if max > 0 {
            nodes.truncate(max);
        }
        nodes
    }

    /// Pick the next node to dial and report whether more connections are wanted.
    ///
    /// Scans bins from shallowest to deepest. The candidate is the most
    /// recently seen dialable offline record of the shallowest under-populated
    /// bin that has one; its retry time is pushed back so repeated calls move
    /// on to other records.
    pub fn suggest(&mut self) -> Suggestion {
        let now = unix_millis();
        let mut prox_limit = None;
        let mut best = None;

        for (po, bucket) in self.buckets.iter().enumerate() {
            if bucket.is_full() {
                continue;
            }
            if prox_limit.is_none() {
                prox_limit = Some(po);
            }
            if best.is_some() {
                continue;
            }
            best = self
                .db
                .bin(po)
                .iter()
                .filter(|r| r.is_dialable(now) && bucket.get(&r.addr).is_none())
                .max_by_key(|r| r.seen)
                .map(|r| r.addr);
        }

        let candidate = best.and_then(|addr| {
            let record = self.db.get_mut(&addr)?;
            let suggested = record.clone();
            record.back_off(&self.config, now);
            Some(suggested)
        });

        Suggestion {
            candidate,
            need_more: prox_limit.is_some(),
            prox_limit: prox_limit.map_or(self.config.max_prox, |po| po as u8),
        }
    }

    /// Restore records persisted by [`Kademlia::save`], merging them into the table.
    ///
    /// A missing file loads nothing. An unreadable or corrupt file is an
    /// error and leaves the table untouched. Records rejected by `meta_decode`,
    /// carrying the local address, or already known are skipped.
    pub fn load(
        &mut self,
        path: &Path,
        mut meta_decode: Option<LoadHook<'_>>,
    ) -> Result<usize, KademliaError> {
        let records = load_file(path)?;
        let total = records.len();
        let mut loaded = 0;

        for mut record in records {
            if record.addr == self.own {
                debug!(addr = %record.addr, "skipping own address in node records");
                continue;
            }
            if let Some(hook) = meta_decode.as_deref_mut() {
                if let Err(e) = hook(&mut record) {
                    warn!(addr = %record.addr, error = %e, "skipping node record");
                    continue;
                }
            }
            let po = self.proximity(&record.addr) as usize;
            if self.db.insert_if_absent(po, record) {
                loaded += 1;
            }
        }

        debug!(path = %path.display(), loaded, total, "loaded node records");
        Ok(loaded)
    }

    /// Persist every known node to `path`. Returns the number of records written.
    ///
    /// See [`Kademlia::snapshot`] for what is written.
    pub fn save(
        &mut self,
        path: &Path,
        meta_encode: Option<SaveHook<'_, N>>,
    ) -> Result<usize, KademliaError> {
        let records = self.snapshot(meta_encode);
        save_file(path, &records)?;
        debug!(path = %path.display(), saved = records.len(), "saved node records");
        Ok(records.len())
    }

    /// Records to persist, for callers that write them elsewhere.
    ///
    /// Connected nodes are first snapshotted through `meta_encode` and marked
    /// as seen now; offline records unseen for longer than the purge interval
    /// are dropped.
    pub fn snapshot(&mut self, mut meta_encode: Option<SaveHook<'_, N>>) -> Vec<NodeRecord> {
        let now = unix_millis();

        for node in self.buckets.iter().flat_map(Bucket::iter) {
            if let Some(record) = self.db.get_mut(&node.addr()) {
                if let Some(hook) = meta_encode.as_deref_mut() {
                    hook(record, &**node);
                }
                record.seen = now;
            }
        }

        let purge_ms = self.config.purge_interval.as_millis() as u64;
        let purged = self.db.retain(|r| now.saturating_sub(r.seen) <= purge_ms);
        if purged > 0 {
            debug!(purged, "purged stale node records");
        }

        self.db.records().cloned().collect()
    }

    fn connected(&self) -> impl Iterator<Item = &Arc<N>> {
        self.buckets.iter().flat_map(Bucket::iter)
    }

    /// Connected node count.
    pub fn count(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    /// Known-offline node count.
    pub fn db_count(&self) -> usize {
        self.db.len().saturating_sub(self.count())
    }

    /// Known node count, connected or not.
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Connected nodes per bin.
    pub fn bin_sizes(&self) -> Vec<usize> {
        self.buckets.iter().map(Bucket::len).collect()
    }

    pub fn connected_in_bin(&self, po: u8) -> usize {
        self.buckets.get(po as usize).map_or(0, Bucket::len)
    }

    /// Compact `po:connected/known` rendering of the non-empty bins.
    pub fn status_line(&self) -> String {
        let mut line = String::new();
        for (po, bucket) in self.buckets.iter().enumerate() {
            let c = bucket.len();
            let k = self.db.bin(po).len();
            if c == 0 && k == 0 {
                continue;
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&format!("{po}:{c}/{k}"));
        }
        if line.is_empty() {
            line.push_str("(empty)");
        }
        line
    }
}

impl<N: Node> fmt::Display for Kademlia<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "kademlia {}", self.own)?;
        writeln!(
            f,
            "connected: {}, known: {}, bucket size: {}, max prox: {}",
            self.count(),
            self.len(),
            self.config.bucket_size,
            self.config.max_prox
        )?;
        for (po, bucket) in self.buckets.iter().enumerate() {
            let known = self.db.bin(po).len();
            if bucket.is_empty() && known == 0 {
                continue;
            }
            write!(f, "{po:03} | {known:>3} |")?;
            for node in bucket.iter() {
                let hex = node.addr().to_string();
                write!(f, " {}", hex.get(2..10).unwrap_or(hex.as_str()))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
