use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Tracks the politeness state of a single host
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of requests reserved against this host in the current crawl
    pub request_count: u32,

    /// Instant of the most recently reserved request slot
    pub last_slot: Option<Instant>,
}

impl HostState {
    /// Creates a new HostState with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next request slot on this host
    ///
    /// # Arguments
    ///
    /// * `interval` - Minimum spacing between two requests to the host
    /// * `now` - The current time instant
    ///
    /// # Returns
    ///
    /// The instant at which the caller may send its request:
    /// `max(now, last_slot + interval)`.
    pub fn reserve(&mut self, interval: Duration, now: Instant) -> Instant {
        let slot = match self.last_slot {
            Some(last) => (last + interval).max(now),
            None => now,
        };
        self.last_slot = Some(slot);
        self.request_count += 1;
        slot
    }

    /// Calculates the time until the next request could be made
    ///
    /// Returns None if a request can be made now.
    pub fn time_until_next_request(&self, interval: Duration, now: Instant) -> Option<Duration> {
        let next = self.last_slot? + interval;
        if next > now {
            Some(next - now)
        } else {
            None
        }
    }
}

/// Enforces the politeness interval between requests to the same host
///
/// Workers reserve a slot before every fetch; concurrent workers hitting one host are
/// spaced `interval` apart regardless of retry state.
#[derive(Debug)]
pub struct HostPacer {
    interval: Duration,
    hosts: Mutex<HashMap<String, HostState>>,
}

impl HostPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Reserves a slot for `host` and returns how long the caller must wait for it
    pub fn reserve(&self, host: &str) -> Duration {
        let now = Instant::now();
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = hosts
            .entry(host.to_string())
            .or_default()
            .reserve(self.interval, now);
        slot.saturating_duration_since(now)
    }

    /// Reserves a slot for `host` and sleeps until it arrives
    pub async fn wait_turn(&self, host: &str) {
        let wait = self.reserve(host);
        if !wait.is_zero() {
            tracing::trace!(host, wait_ms = wait.as_millis() as u64, "Politeness wait");
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of requests reserved against `host` so far
    pub fn request_count(&self, host: &str) -> u32 {
        let hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts.get(host).map(|h| h.request_count).unwrap_or(0)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
