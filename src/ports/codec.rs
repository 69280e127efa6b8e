use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error type for encoding and decoding messages
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CodecError {
    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),
}

/// Raised when no codec matches a client's marshaller selection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MarshallerResolutionError {
    /// A marshaller bean name was configured but nothing is registered under it
    #[error("Marshaller '{0}' is not registered")]
    UnknownName(String),

    /// A marshaller class name was configured but no codec of that type exists
    #[error("No marshaller of type '{0}' is registered")]
    UnknownType(String),

    /// Nothing was configured and the registry is empty
    #[error("No marshaller is available in the registry")]
    NoneAvailable,
}

/// A remote-side fault carried in a response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub code: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// In-memory message exchanged with a remote service: header blocks plus a body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub header: Map<String, Value>,
    #[serde(default)]
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
}

impl Message {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    pub fn fault(fault: Fault) -> Self {
        Self {
            fault: Some(fault),
            ..Default::default()
        }
    }

    /// Insert or replace a header block.
    pub fn set_header(&mut self, name: impl Into<String>, block: Value) {
        self.header.insert(name.into(), block);
    }
}

/// Codec converts between [`Message`] values and their wire representation
pub trait Codec: Send + Sync + 'static {
    /// Symbolic type name used for lookups by type (e.g. `json`)
    fn codec_type(&self) -> &str;

    /// MIME type written on outbound requests
    fn content_type(&self) -> &str;

    fn encode(&self, message: &Message) -> Result<Bytes, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError>;
}

/// MarshallerRegistry resolves codecs by registration name or by type
pub trait MarshallerRegistry: Send + Sync + 'static {
    fn lookup_by_name(&self, name: &str) -> Option<Arc<dyn Codec>>;

    /// Every codec of the given type, in registration order
    fn lookup_by_type(&self, codec_type: &str) -> Vec<Arc<dyn Codec>>;

    /// Every registered codec, in registration order
    fn list_all(&self) -> Vec<Arc<dyn Codec>>;
}
