//! Fetch coalescing for concurrent cold reads.
//!
//! When several tasks miss both tiers for the same key at once, only the first
//! performs the network fetch. The rest subscribe to its outcome.
//!
//! ```text
//! get(u) A ─┐
//!           │                          ┌─────────┐
//! get(u) B ─┼──► FetchCoalescer ──────►│ 1 fetch │
//!           │        │                 └────┬────┘
//! get(u) C ─┘        ▼                      │
//!              [A, B, C receive  ◄──────────┘
//!               the same result]
//! ```
//!
//! Disabled unless `CacheConfig::coalesce_fetches` is set.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::{CacheError, CacheKey};
use crate::codec::CachedImage;

/// Outcome shared between the leader and its waiters.
pub type FetchOutcome = Result<CachedImage, CacheError>;

/// Tracks in-flight fetches by cache key.
pub struct FetchCoalescer {
    in_flight: DashMap<CacheKey, broadcast::Sender<FetchOutcome>>,
    total_requests: AtomicU64,
    coalesced_requests: AtomicU64,
    new_requests: AtomicU64,
}

/// Counters for monitoring coalescing effectiveness.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Requests registered
    pub total_requests: u64,
    /// Requests that waited on an existing fetch
    pub coalesced_requests: u64,
    /// Requests that started a fetch
    pub new_requests: u64,
}

impl CoalescerStats {
    /// Share of requests that were coalesced (0.0 to 1.0).
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.coalesced_requests as f64 / self.total_requests as f64
        }
    }
}

/// Result of registering interest in a key.
pub enum Registration<'a> {
    /// No fetch was in flight. The caller must fetch and call [`Leader::complete`].
    Leader(Leader<'a>),
    /// Another task is fetching. Wait with [`Waiter::wait`].
    Waiter(Waiter),
}

/// Handle held by the task performing the fetch.
///
/// Dropping it without completing closes the channel, and every waiter
/// receives [`CacheError::Unknown`].
pub struct Leader<'a> {
    coalescer: &'a FetchCoalescer,
    key: CacheKey,
    completed: bool,
}

impl Leader<'_> {
    /// Publish `outcome` to all waiters and release the key.
    pub fn complete(mut self, outcome: &FetchOutcome) {
        self.completed = true;
        if let Some((_, tx)) = self.coalescer.in_flight.remove(&self.key) {
            let waiters = tx.receiver_count();
            // Receivers may already be gone
            let _ = tx.send(outcome.clone());
            if waiters > 0 {
                debug!(key = %self.key, waiters = waiters, "Broadcast fetch result to coalesced waiters");
            }
        }
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if !self.completed && self.coalescer.in_flight.remove(&self.key).is_some() {
            debug!(key = %self.key, "In-flight fetch abandoned, waiters released");
        }
    }
}

/// Handle held by a task waiting on someone else's fetch.
pub struct Waiter {
    rx: broadcast::Receiver<FetchOutcome>,
}

impl Waiter {
    /// Wait for the leader's outcome.
    pub async fn wait(mut self) -> FetchOutcome {
        self.rx.recv().await.unwrap_or(Err(CacheError::Unknown))
    }
}

impl FetchCoalescer {
    /// Create an empty coalescer.
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
            total_requests: AtomicU64::new(0),
            coalesced_requests: AtomicU64::new(0),
            new_requests: AtomicU64::new(0),
        }
    }

    /// Register interest in `key`.
    ///
    /// Uses the map's entry API so check-and-insert is atomic.
    pub fn register(&self, key: &CacheKey) -> Registration<'_> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let rx = entry.get().subscribe();
                self.coalesced_requests.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Coalescing fetch, waiting for in-flight request");
                Registration::Waiter(Waiter { rx })
            }
            Entry::Vacant(entry) => {
                // One message is ever sent per channel
                let (tx, _rx) = broadcast::channel(1);
                entry.insert(tx);
                self.new_requests.fetch_add(1, Ordering::Relaxed);
                Registration::Leader(Leader {
                    coalescer: self,
                    key: key.clone(),
                    completed: false,
                })
            }
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            new_requests: self.new_requests.load(Ordering::Relaxed),
        }
    }

    /// Number of fetches currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

impl Default for FetchCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use std::sync::Arc;

    fn key(n: u32) -> CacheKey {
        CacheKey::derive(&format!("https://example.com/{n}.png"), None)
    }

    fn image() -> CachedImage {
        Arc::new(DynamicImage::ImageRgb8(RgbImage::new(2, 2)))
    }

    #[test]
    fn test_first_registration_leads() {
        let coalescer = FetchCoalescer::new();
        assert!(matches!(coalescer.register(&key(1)), Registration::Leader(_)));
    }

    #[tokio::test]
    async fn test_waiter_receives_leader_result() {
        let coalescer = FetchCoalescer::new();
        let leader = match coalescer.register(&key(1)) {
            Registration::Leader(l) => l,
            Registration::Waiter(_) => panic!("expected leader"),
        };
        let waiter = match coalescer.register(&key(1)) {
            Registration::Waiter(w) => w,
            Registration::Leader(_) => panic!("expected waiter"),
        };

        leader.complete(&Ok(image()));
        let outcome = waiter.wait().await.unwrap();
        assert_eq!(outcome.width(), 2);
        assert_eq!(coalescer.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let coalescer = FetchCoalescer::new();
        let Registration::Leader(leader) = coalescer.register(&key(1)) else {
            panic!("expected leader");
        };
        let Registration::Waiter(waiter) = coalescer.register(&key(1)) else {
            panic!("expected waiter");
        };

        leader.complete(&Err(CacheError::HttpStatus(404)));
        assert!(matches!(waiter.wait().await, Err(CacheError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_waiters() {
        let coalescer = FetchCoalescer::new();
        let Registration::Leader(leader) = coalescer.register(&key(1)) else {
            panic!("expected leader");
        };
        let Registration::Waiter(waiter) = coalescer.register(&key(1)) else {
            panic!("expected waiter");
        };

        drop(leader);
        assert!(matches!(waiter.wait().await, Err(CacheError::Unknown)));
        assert_eq!(coalescer.in_flight_count(), 0);
    }

    #[test]
    fn test_distinct_keys_do_not_coalesce() {
        let coalescer = FetchCoalescer::new();
        let _a = coalescer.register(&key(1));
        let _b = coalescer.register(&key(2));

        let stats = coalescer.stats();
        assert_eq!(stats.new_requests, 2);
        assert_eq!(stats.coalesced_requests, 0);
        assert_eq!(coalescer.in_flight_count(), 2);
    }

    #[test]
    fn test_stats_ratio() {
        let coalescer = FetchCoalescer::new();
        let _leader = coalescer.register(&key(1));
        let _w1 = coalescer.register(&key(1));
        let _w2 = coalescer.register(&key(1));
        let _w3 = coalescer.register(&key(1));

        let stats = coalescer.stats();
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.coalesced_requests, 3);
        assert_eq!(stats.coalescing_ratio(), 0.75);
    }
}
