//! Constructor-time cache configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::codec::FormatPolicy;

/// File name of the metadata index inside the cache root.
pub const DEFAULT_INDEX_FILENAME: &str = "telescope.json";

/// Age after which a canonical disk entry is refreshed on access (5 days).
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 24 * 60 * 60);

/// Decoded bytes the memory tier may hold (256 MB).
pub const DEFAULT_MEMORY_CAPACITY: u64 = 256 * 1024 * 1024;

/// Interval between metadata index flushes.
pub const DEFAULT_INDEX_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Identifiers refreshed in parallel by `refresh_all`.
pub const DEFAULT_REFRESH_CONCURRENCY: usize = 8;

/// Per-request timeout applied by the production transport.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cache engine configuration.
///
/// Every field has a default; override with the `with_*` builders.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use telescope::config::CacheConfig;
///
/// let config = CacheConfig::default()
///     .with_root_dir("/tmp/telescope".into())
///     .with_ttl(Duration::ZERO);
///
/// assert_eq!(config.index_file(), std::path::PathBuf::from("/tmp/telescope/telescope.json"));
/// assert!(!config.staleness_enabled());
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding one file per cached entry.
    pub root_dir: PathBuf,
    /// Explicit index location. `None` means `<root_dir>/telescope.json`.
    pub index_file: Option<PathBuf>,
    /// Staleness threshold for canonical entries. Zero disables refresh-on-read.
    pub ttl: Duration,
    /// How decoded images are encoded for disk.
    pub format_policy: FormatPolicy,
    /// Memory tier capacity in decoded bytes.
    pub memory_capacity_bytes: u64,
    /// How often a dirty index is written to disk.
    pub index_flush_interval: Duration,
    /// Parallelism of `refresh_all`.
    pub refresh_concurrency: usize,
    /// Share one in-flight fetch between concurrent cold requests for a key.
    pub coalesce_fetches: bool,
    /// Timeout handed to the production transport.
    pub request_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let root_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("telescope");

        Self {
            root_dir,
            index_file: None,
            ttl: DEFAULT_TTL,
            format_policy: FormatPolicy::default(),
            memory_capacity_bytes: DEFAULT_MEMORY_CAPACITY,
            index_flush_interval: DEFAULT_INDEX_FLUSH_INTERVAL,
            refresh_concurrency: DEFAULT_REFRESH_CONCURRENCY,
            coalesce_fetches: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl CacheConfig {
    /// Resolved index file location.
    pub fn index_file(&self) -> PathBuf {
        self.index_file
            .clone()
            .unwrap_or_else(|| self.root_dir.join(DEFAULT_INDEX_FILENAME))
    }

    /// Whether disk hits are checked against the TTL.
    pub fn staleness_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Set the cache root directory.
    pub fn with_root_dir(mut self, dir: PathBuf) -> Self {
        self.root_dir = dir;
        self
    }

    /// Set an explicit index file path.
    pub fn with_index_file(mut self, path: PathBuf) -> Self {
        self.index_file = Some(path);
        self
    }

    /// Set the staleness TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the encoding policy.
    pub fn with_format_policy(mut self, policy: FormatPolicy) -> Self {
        self.format_policy = policy;
        self
    }

    /// Set the memory tier capacity in bytes.
    pub fn with_memory_capacity(mut self, bytes: u64) -> Self {
        self.memory_capacity_bytes = bytes;
        self
    }

    /// Set the index flush interval.
    pub fn with_index_flush_interval(mut self, interval: Duration) -> Self {
        self.index_flush_interval = interval;
        self
    }

    /// Set `refresh_all` parallelism. Values below 1 are treated as 1.
    pub fn with_refresh_concurrency(mut self, n: usize) -> Self {
        self.refresh_concurrency = n.max(1);
        self
    }

    /// Enable or disable fetch coalescing.
    pub fn with_coalesce_fetches(mut self, enabled: bool) -> Self {
        self.coalesce_fetches = enabled;
        self
    }

    /// Set the transport request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
