//! Network retrieval of images.
//!
//! [`Transport`] is the raw byte-fetching capability, with [`ReqwestTransport`]
//! as the production implementation. [`Fetcher`] sits on top, validates the
//! identifier, decodes the body and classifies every failure into a
//! [`CacheError`](crate::cache::CacheError).

mod fetcher;
mod http;
mod types;

pub use fetcher::Fetcher;
pub use http::{ReqwestTransport, Transport, DEFAULT_USER_AGENT};
pub use types::TransportError;

#[cfg(test)]
pub use http::tests::MockTransport;
