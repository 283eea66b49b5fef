//! Image fetcher: one network request per call, with classified failures.

use std::sync::Arc;

use image::DynamicImage;
use tracing::debug;
use url::Url;

use super::http::Transport;
use super::types::TransportError;
use crate::cache::CacheError;
use crate::codec::ImageCodec;

/// Retrieves and decodes remote images.
///
/// Performs exactly one transport request per [`fetch`](Self::fetch); it does
/// not deduplicate concurrent requests for the same identifier.
pub struct Fetcher<T, C> {
    transport: Arc<T>,
    codec: Arc<C>,
}

impl<T, C> Fetcher<T, C>
where
    T: Transport,
    C: ImageCodec,
{
    /// Create a fetcher over the given transport and codec.
    pub fn new(transport: Arc<T>, codec: Arc<C>) -> Self {
        Self { transport, codec }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Fetch `identifier` and decode it.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidIdentifier`] if `identifier` is not an absolute
    ///   `http`/`https` URL
    /// - [`CacheError::HttpStatus`] for a non-2xx response
    /// - [`CacheError::Transport`] for DNS, connect, timeout or body failures
    /// - [`CacheError::NotAnImage`] if a 2xx body does not decode
    pub async fn fetch(&self, identifier: &str) -> Result<DynamicImage, CacheError> {
        validate_identifier(identifier)?;

        let bytes = self
            .transport
            .fetch(identifier)
            .await
            .map_err(|e| match e {
                TransportError::Status(code) => CacheError::HttpStatus(code),
                TransportError::Network(msg) => CacheError::Transport(msg),
            })?;

        debug!(identifier = identifier, bytes = bytes.len(), "Fetched resource");

        self.codec
            .decode(&bytes)
            .map_err(|e| CacheError::NotAnImage(e.to_string()))
    }
}

/// Check that `identifier` is an absolute URL the transport can request.
pub(crate) fn validate_identifier(identifier: &str) -> Result<Url, CacheError> {
    let url =
        Url::parse(identifier).map_err(|_| CacheError::InvalidIdentifier(identifier.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(CacheError::InvalidIdentifier(identifier.to_string())),
    }
}
