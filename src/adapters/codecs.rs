use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::ports::codec::{Codec, CodecError, MarshallerRegistry, Message};

pub const JSON_CODEC_TYPE: &str = "json";

/// JSON envelope codec.
///
/// Encodes `{"header": {..}, "body": .., "fault": {..}}`. Decoding accepts the
/// same envelope or a bare JSON document, which becomes the body.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    fn is_envelope(value: &Value) -> bool {
        match value {
            Value::Object(map) => {
                !map.is_empty()
                    && map
                        .keys()
                        .all(|k| matches!(k.as_str(), "header" | "body" | "fault"))
            }
            _ => false,
        }
    }
}

impl Codec for JsonCodec {
    fn codec_type(&self) -> &str {
        JSON_CODEC_TYPE
    }

    fn content_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, message: &Message) -> Result<Bytes, CodecError> {
        serde_json::to_vec(message)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Message::default());
        }
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        if Self::is_envelope(&value) {
            serde_json::from_value(value).map_err(|e| CodecError::Decode(e.to_string()))
        } else {
            Ok(Message::new(value))
        }
    }
}

/// Creates a codec for a symbolic type name on demand.
pub type CodecFactory = Arc<dyn Fn() -> Arc<dyn Codec> + Send + Sync>;

pub fn json_codec() -> Arc<dyn Codec> {
    Arc::new(JsonCodec::new())
}

/// In-memory marshaller registry keeping registration order.
///
/// Named instances are looked up by name; lookups by type return the named
/// instances of that type, or a fresh one from the factory registered for the
/// type when no instance exists.
#[derive(Default, Clone)]
pub struct CodecRegistry {
    entries: Vec<(String, Arc<dyn Codec>)>,
    factories: Vec<(String, CodecFactory)>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the JSON codec under the name `json` and a factory for its type.
    pub fn with_builtin() -> Self {
        Self::new()
            .register(JSON_CODEC_TYPE, Arc::new(JsonCodec::new()))
            .register_factory(JSON_CODEC_TYPE, Arc::new(json_codec))
    }

    /// Map a symbolic type name to a constructor.
    pub fn register_factory(mut self, codec_type: impl Into<String>, factory: CodecFactory) -> Self {
        let codec_type = codec_type.into();
        self.factories.retain(|(t, _)| *t != codec_type);
        self.factories.push((codec_type, factory));
        self
    }

    /// Register `codec` under `name`; a later registration under the same name replaces it in place.
    pub fn register(mut self, name: impl Into<String>, codec: Arc<dyn Codec>) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = codec,
            None => self.entries.push((name, codec)),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MarshallerRegistry for CodecRegistry {
    fn lookup_by_name(&self, name: &str) -> Option<Arc<dyn Codec>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, codec)| codec.clone())
    }

    fn lookup_by_type(&self, codec_type: &str) -> Vec<Arc<dyn Codec>> {
        let found: Vec<Arc<dyn Codec>> = self
            .entries
            .iter()
            .filter(|(_, codec)| codec.codec_type() == codec_type)
            .map(|(_, codec)| codec.clone())
            .collect();
        if !found.is_empty() {
            return found;
        }
        self.factories
            .iter()
            .find(|(t, _)| t == codec_type)
            .map(|(_, factory)| vec![factory()])
            .unwrap_or_default()
    }

    fn list_all(&self) -> Vec<Arc<dyn Codec>> {
        self.entries.iter().map(|(_, codec)| codec.clone()).collect()
    }
}
