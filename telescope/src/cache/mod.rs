//! Two-tier image cache.
//!
//! Decoded images live in a bounded memory tier; their encoded bytes live in a
//! flat directory on disk, one file per [`CacheKey`]. A JSON metadata index
//! remembers which identifier produced each canonical file so the whole cache
//! can be refreshed from the network.

mod coalesce;
mod disk;
mod engine;
mod index;
mod key;
mod memory;
mod stats;
mod r#trait;
mod types;

pub use coalesce::{CoalescerStats, FetchCoalescer, FetchOutcome, Leader, Registration, Waiter};
pub use disk::DiskTier;
pub use engine::CacheEngine;
pub use index::{spawn_flush_daemon, MetadataIndex};
pub use key::CacheKey;
pub use memory::MemoryTier;
pub use r#trait::{BoxFuture, Cache};
pub use stats::{CacheStats, StatsRecorder};
pub use types::{CacheError, RefreshFailure};
