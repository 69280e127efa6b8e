pub mod codec;
pub mod config_source;
pub mod interceptor;
pub mod transport;
