use http::StatusCode;
use thiserror::Error;

use crate::{
    config::group::ConfigurationError,
    ports::{
        codec::{CodecError, MarshallerResolutionError},
        interceptor::InterceptorError,
        transport::{TransportConstructionError, TransportError},
    },
};

/// Why a client could not be produced. Failed builds are never cached.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientFactoryError {
    #[error("Invalid configuration for client '{client_id}': {source}")]
    Configuration {
        client_id: String,
        #[source]
        source: ConfigurationError,
    },

    #[error("Failed to build transport for client '{client_id}': {source}")]
    Transport {
        client_id: String,
        #[source]
        source: TransportConstructionError,
    },

    #[error("Failed to resolve marshaller for client '{client_id}': {source}")]
    Marshaller {
        client_id: String,
        #[source]
        source: MarshallerResolutionError,
    },
}

impl ClientFactoryError {
    pub fn client_id(&self) -> &str {
        match self {
            Self::Configuration { client_id, .. }
            | Self::Transport { client_id, .. }
            | Self::Marshaller { client_id, .. } => client_id,
        }
    }
}

/// Error returned by a remote call through a built client
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RemoteCallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Interceptor(#[from] InterceptorError),

    /// The remote side answered with a fault body
    #[error("Remote fault {code}: {reason}")]
    Fault { code: String, reason: String },

    /// Non-success status without a decodable fault
    #[error("Remote service returned status {status}")]
    Status { status: StatusCode, body: String },

    #[error("Client '{0}' has no endpoint configured and none was given")]
    NoEndpoint(String),

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// A request interceptor stopped the chain without supplying a response
    #[error("Request was stopped by interceptor '{0}' without a response")]
    Intercepted(String),
}

/// Error returned by [`ClientFactory::invoke`](crate::core::factory::ClientFactory::invoke).
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error(transparent)]
    Build(#[from] ClientFactoryError),

    #[error(transparent)]
    Call(#[from] RemoteCallError),
}
