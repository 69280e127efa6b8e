pub mod codecs;
pub mod config_providers;
pub mod http_transport;
pub mod interceptors;

/// Re-export commonly used types from adapters
pub use codecs::{CodecRegistry, JsonCodec};
pub use config_providers::{FileConfigSource, StaticConfigSource};
pub use http_transport::{HttpTransport, HttpTransportBuilder};
pub use interceptors::{LoggingInterceptor, StaticInterceptorRegistry};
