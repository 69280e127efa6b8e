use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use thiserror::Error;

use crate::config::client::ClientConfiguration;

/// Error raised while building a transport from a client configuration
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportConstructionError {
    #[error("Invalid proxy configuration: {0}")]
    InvalidProxy(String),

    #[error("Invalid connection pool configuration: {0}")]
    InvalidPool(String),

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("No async runtime available to drive the transport: {0}")]
    Runtime(String),
}

/// Error raised by a transport while performing a call
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Connection to the remote host could not be established
    #[error("Connection error: {0}")]
    Connect(String),

    /// The connection broke while the exchange was in flight
    #[error("I/O error: {0}")]
    Io(String),

    /// Connect or read timeout expired
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// No pooled connection became available within the connect-request timeout
    #[error("Timed out after {0} ms waiting for a pooled connection")]
    PoolTimeout(u64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether a failed attempt may be repeated on an idempotent request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Io(_))
    }
}

/// Result type alias for transport calls
pub type TransportResult<T> = Result<T, TransportError>;

/// Request extension marking a request as safe to repeat regardless of its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Idempotent;

/// Whether a request may be retried: idempotent method or explicit marker.
pub fn is_idempotent<B>(req: &Request<B>) -> bool {
    req.method().is_idempotent() || req.extensions().get::<Idempotent>().is_some()
}

/// Transport defines the port for sending a fully encoded request to a remote service
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send a request and return the buffered response.
    ///
    /// Non-success statuses are returned as responses, not errors.
    async fn send(&self, req: Request<Bytes>) -> TransportResult<Response<Bytes>>;
}

/// TransportBuilder creates one transport (and its connection pool) per client
pub trait TransportBuilder: Send + Sync + 'static {
    fn build(
        &self,
        config: &ClientConfiguration,
    ) -> Result<Arc<dyn Transport>, TransportConstructionError>;
}
