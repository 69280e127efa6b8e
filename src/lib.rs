//! Courier - a factory for configured outbound service clients.
//!
//! Courier builds, caches and hands out one [`ServiceClient`] per logical
//! identifier. Each client is resolved from a layered property source (built-in
//! defaults, then a named template, then the keys under
//! `soapclient.def.<id>.`), and owns its own message codec, an ordered
//! interceptor chain and a pooled HTTP transport.
//!
//! # Features
//! - Single-flight client construction: concurrent first requests share one build
//! - Per-client connect, connection-request and read timeouts
//! - Optional HTTP proxy with basic credentials
//! - Bounded connection pool (total and per route) with idle eviction
//! - WS-Security style UsernameToken and Timestamp headers, always first in the chain
//! - Interceptor substitution and full chain overrides per client
//! - Live reload of the property file with targeted cache invalidation
//! - Metrics through the `metrics` facade and structured tracing via `tracing`
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier::{
//!     ClientFactory, CodecRegistry, FileConfigSource, HttpTransportBuilder,
//!     StaticInterceptorRegistry,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let source = Arc::new(FileConfigSource::new("clients.toml")?);
//! let factory = ClientFactory::new(
//!     source,
//!     Arc::new(CodecRegistry::with_builtin()),
//!     Arc::new(StaticInterceptorRegistry::default()),
//!     Arc::new(HttpTransportBuilder::new()),
//! );
//!
//! let reply = factory
//!     .invoke("billing", serde_json::json!({ "invoice": 42 }))
//!     .await?;
//! println!("{}", reply.body);
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! the factory, the client and the chain ordering inside `core`. End users should prefer the
//! re-exports documented below instead of reaching into internal modules directly.
//!
//! # Error Handling
//! Library APIs return domain error types built with `thiserror`:
//! [`ClientFactoryError`] for construction, [`RemoteCallError`] for exchanges and
//! [`InvokeError`] when both can occur. Loading and reloading property files return
//! `eyre::Result<T>` with context attached.
//!
//! # Concurrency & Data Structures
//! The client cache and the route gates use `scc::HashMap` and only its async APIs, so no
//! lock is held across an await point.
//!
//! # Stability
//! This crate is early stage; APIs may evolve.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{
        CodecRegistry, FileConfigSource, HttpTransportBuilder, JsonCodec, LoggingInterceptor,
        StaticConfigSource, StaticInterceptorRegistry,
    },
    config::{ClientConfiguration, ConfigurationError, ConfigurationGroup},
    core::{
        ClientFactory, ClientFactoryError, Invocation, InvokeError, RemoteCallError,
        ServiceClient, WsSecurityInterceptor,
    },
    utils::spawn_config_refresh,
};
