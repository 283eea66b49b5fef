//! Process-wide cache instance.
//!
//! Applications that want a single cache for the whole process call [`init`]
//! once at startup, reach it with [`get`] afterwards and call [`shutdown`]
//! before exiting so pending index changes reach disk.

use tokio::sync::OnceCell;
use tracing::info;

use crate::cache::{CacheEngine, CacheError};
use crate::codec::ImageCrateCodec;
use crate::config::CacheConfig;
use crate::provider::ReqwestTransport;

/// The engine type used for the shared instance.
pub type SharedCache = CacheEngine<ReqwestTransport, ImageCrateCodec>;

static INSTANCE: OnceCell<SharedCache> = OnceCell::const_new();

/// Open the shared cache with `config`.
///
/// Only the first successful call opens an engine; later calls return the
/// existing instance and ignore their `config`. A failed call leaves the
/// instance uninitialized so it can be retried.
pub async fn init(config: CacheConfig) -> Result<&'static SharedCache, CacheError> {
    INSTANCE
        .get_or_try_init(|| async move {
            let transport = ReqwestTransport::new(config.request_timeout)
                .map_err(|e| CacheError::Transport(e.to_string()))?;
            let engine = CacheEngine::open(config, transport, ImageCrateCodec::new()).await?;
            info!("Shared cache initialized");
            Ok(engine)
        })
        .await
}

/// The shared cache, if [`init`] has succeeded.
pub fn get() -> Option<&'static SharedCache> {
    INSTANCE.get()
}

/// Flush and stop the shared cache. Does nothing if it was never opened.
pub async fn shutdown() -> Result<(), CacheError> {
    match INSTANCE.get() {
        Some(engine) => engine.shutdown().await,
        None => Ok(()),
    }
}
