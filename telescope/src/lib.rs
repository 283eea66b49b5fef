//! Telescope - two-tier caching for remotely fetched images.
//!
//! Images are served from memory, then from disk, and only fetched over the
//! network on a double miss. Fetched images are written through to both
//! tiers. Tagged variants (edits, resizes) are stored alongside the canonical
//! image but never fetched.
//!
//! ```no_run
//! use telescope::cache::CacheEngine;
//! use telescope::codec::ImageCrateCodec;
//! use telescope::config::CacheConfig;
//! use telescope::provider::ReqwestTransport;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CacheConfig::default();
//! let transport = ReqwestTransport::new(config.request_timeout)?;
//! let cache = CacheEngine::open(config, transport, ImageCrateCodec::new()).await?;
//!
//! let image = cache.get("https://example.com/cat.png").await?;
//! println!("{}x{}", image.width(), image.height());
//!
//! cache.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod logging;
pub mod provider;
pub mod shared;

/// Version of the Telescope library and CLI.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
