use metrics::{Counter, Gauge};

/// Hive metrics.
#[derive(Clone, Debug)]
pub(crate) struct HiveMetrics {
    /// Currently connected peers
    connected_peers: Gauge,
    /// Known-offline peers
    known_peers: Gauge,
    /// Dials requested from the transport
    pub(crate) dials_total: Counter,
    /// Dials the transport refused
    pub(crate) dial_errors_total: Counter,
    /// Discovery probes sent
    pub(crate) probes_sent_total: Counter,
    /// Gossiped entries failing the relay check
    pub(crate) peers_rejected_total: Counter,
    /// Gossiped entries merged into the table
    pub(crate) peers_learned_total: Counter,
}

impl Default for HiveMetrics {
    fn default() -> Self {
        Self {
            connected_peers: metrics::gauge!("bzz_hive_connected_peers"),
            known_peers: metrics::gauge!("bzz_hive_known_peers"),
            dials_total: metrics::counter!("bzz_hive_dials_total"),
            dial_errors_total: metrics::counter!("bzz_hive_dial_errors_total"),
            probes_sent_total: metrics::counter!("bzz_hive_probes_sent_total"),
            peers_rejected_total: metrics::counter!("bzz_hive_peers_rejected_total"),
            peers_learned_total: metrics::counter!("bzz_hive_peers_learned_total"),
        }
    }
}

impl HiveMetrics {
    pub(crate) fn record_population(&self, connected: usize, known_offline: usize) {
        self.connected_peers.set(connected as f64);
        self.known_peers.set(known_offline as f64);
    }
}
