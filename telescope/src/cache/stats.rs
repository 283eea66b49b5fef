//! Cache statistics tracking and reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free counters updated by the engine.
#[derive(Debug)]
pub struct StatsRecorder {
    memory_hits: AtomicU64,
    memory_misses: AtomicU64,
    disk_hits: AtomicU64,
    disk_misses: AtomicU64,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
    disk_write_failures: AtomicU64,
    background_refreshes: AtomicU64,
    created_at: Instant,
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! recorder {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            #[doc = concat!("Increment the `", stringify!($field), "` counter.")]
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl StatsRecorder {
    /// Create a recorder with all counters at zero.
    pub fn new() -> Self {
        Self {
            memory_hits: AtomicU64::new(0),
            memory_misses: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            disk_misses: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            disk_write_failures: AtomicU64::new(0),
            background_refreshes: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    recorder! {
        record_memory_hit => memory_hits,
        record_memory_miss => memory_misses,
        record_disk_hit => disk_hits,
        record_disk_miss => disk_misses,
        record_fetch => fetches,
        record_fetch_failure => fetch_failures,
        record_disk_write_failure => disk_write_failures,
        record_background_refresh => background_refreshes,
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            memory_misses: self.memory_misses.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            disk_misses: self.disk_misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            disk_write_failures: self.disk_write_failures.load(Ordering::Relaxed),
            background_refreshes: self.background_refreshes.load(Ordering::Relaxed),
            uptime: self.created_at.elapsed(),
        }
    }
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub memory_misses: u64,
    pub disk_hits: u64,
    pub disk_misses: u64,
    /// Network fetches attempted.
    pub fetches: u64,
    pub fetch_failures: u64,
    pub disk_write_failures: u64,
    /// Staleness-triggered refreshes spawned.
    pub background_refreshes: u64,
    pub uptime: Duration,
}

impl CacheStats {
    /// Memory tier hit rate (0.0 to 1.0).
    pub fn memory_hit_rate(&self) -> f64 {
        ratio(self.memory_hits, self.memory_hits + self.memory_misses)
    }

    /// Share of reads served without the network (0.0 to 1.0).
    pub fn overall_hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.disk_hits;
        ratio(hits, hits + self.disk_misses)
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_recorder_is_zero() {
        let stats = StatsRecorder::new().snapshot();
        assert_eq!(stats.memory_hits, 0);
        assert_eq!(stats.fetches, 0);
        assert_eq!(stats.overall_hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rates() {
        let recorder = StatsRecorder::new();
        recorder.record_memory_hit();
        recorder.record_memory_miss();
        recorder.record_disk_hit();
        recorder.record_memory_miss();
        recorder.record_disk_miss();

        let stats = recorder.snapshot();
        assert_eq!(stats.memory_hit_rate(), 1.0 / 3.0);
        // 1 memory hit + 1 disk hit out of 3 reads
        assert!((stats.overall_hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fetch_counters() {
        let recorder = StatsRecorder::new();
        recorder.record_fetch();
        recorder.record_fetch();
        recorder.record_fetch_failure();

        let stats = recorder.snapshot();
        assert_eq!(stats.fetches, 2);
        assert_eq!(stats.fetch_failures, 1);
    }
}
