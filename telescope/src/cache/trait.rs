//! Cache trait definition for dependency injection.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use image::DynamicImage;

use crate::cache::CacheError;
use crate::codec::{CachedImage, FormatPolicy};

/// Boxed future returned by [`Cache`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Image cache abstraction.
///
/// Callers that only need to read and manage cached images depend on this
/// trait rather than a concrete engine. [`CacheEngine`](crate::cache::CacheEngine)
/// is the production implementation.
///
/// # Example
///
/// ```no_run
/// use telescope::cache::{Cache, CacheError};
///
/// async fn thumbnail_source(cache: &dyn Cache, url: &str) -> Result<(u32, u32), CacheError> {
///     let image = cache.get(url).await?;
///     Ok((image.width(), image.height()))
/// }
/// ```
pub trait Cache: Send + Sync {
    /// Return the canonical image for `identifier`, fetching it on a double miss.
    fn get<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<CachedImage, CacheError>>;

    /// Return the variant stored under `tag`. Never touches the network.
    fn get_with_tag<'a>(
        &'a self,
        identifier: &'a str,
        tag: &'a str,
    ) -> BoxFuture<'a, Result<CachedImage, CacheError>>;

    /// Store `image` for `identifier`, as a tagged variant or (with `None`) as
    /// the canonical copy.
    fn edit<'a>(
        &'a self,
        identifier: &'a str,
        image: DynamicImage,
        tag: Option<&'a str>,
    ) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Remove the entry for `identifier` and `tag` from every tier.
    fn delete<'a>(&'a self, identifier: &'a str, tag: Option<&'a str>) -> BoxFuture<'a, ()>;

    /// Remove every entry.
    fn delete_all(&self) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Discard and refetch the canonical image for `identifier`.
    fn refresh<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<(), CacheError>>;

    /// Refresh every identifier in the metadata index.
    fn refresh_all(&self) -> BoxFuture<'_, Result<(), CacheError>>;

    /// Staleness threshold for canonical disk entries. Zero means disabled.
    fn ttl(&self) -> Duration;

    /// Policy used to encode images for disk.
    fn format_policy(&self) -> FormatPolicy;
}
