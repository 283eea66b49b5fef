//! Configuration for the cache engine.
//!
//! [`CacheConfig`] is the constructor-time configuration, built in code with
//! `with_*` methods. [`ConfigFile`] overlays values from an optional INI file
//! onto the defaults.

mod cache;
mod file;
mod size;

pub use cache::{
    CacheConfig, DEFAULT_INDEX_FILENAME, DEFAULT_INDEX_FLUSH_INTERVAL, DEFAULT_MEMORY_CAPACITY,
    DEFAULT_REFRESH_CONCURRENCY, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TTL,
};
pub use file::{config_file_path, ConfigFile, ConfigFileError};
pub use size::{format_size, parse_size, SizeParseError};
