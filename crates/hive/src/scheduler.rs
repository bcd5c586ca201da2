use std::time::Duration;

use tokio::time::Instant;

/// Decides when the maintenance task should wake the probe loop.
///
/// The scheduler is armed while the routing table wants more connections and
/// fires at most once per interval. It holds no timers itself; the owner
/// polls it on every tick under the hive lock.
#[derive(Debug)]
pub struct Scheduler {
    interval: Duration,
    armed: bool,
    last_fired: Option<Instant>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval, armed: false, last_fired: None }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Arm when the table needs more peers, disarm once it is saturated.
    pub fn set_need(&mut self, need_more: bool) {
        self.armed = need_more;
    }

    /// Whether to fire now. Firing is recorded, so a second call within the
    /// same interval returns false.
    pub fn should_fire(&mut self, now: Instant, has_candidates: bool) -> bool {
        if !self.armed || !has_candidates {
            return false;
        }
        let elapsed = self
            .last_fired
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if elapsed {
            self.last_fired = Some(now);
        }
        elapsed
    }
}
