//! Caching factory for service clients.
//!
//! Each identifier moves through three states: unresolved (no cache entry),
//! resolving (one caller is building, others wait on the same slot) and cached.
//! Invalidating a slot that is still resolving marks it stale instead of
//! removing it: the pending build finishes, nobody is handed its result, and
//! the next build for that identifier starts only afterwards. A failed build
//! removes its slot, so the next caller tries again.
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use scc::HashMap;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::Instrument;

use crate::{
    config::{client::ClientConfiguration, group::ConfigurationGroup},
    core::{
        client::{Invocation, ServiceClient},
        error::{ClientFactoryError, InvokeError},
        ordering::InterceptorOrderingPolicy,
        security::WsSecurityInterceptor,
    },
    metrics,
    ports::{
        codec::{Codec, MarshallerRegistry, MarshallerResolutionError, Message},
        config_source::ConfigurationSource,
        interceptor::{Interceptor, InterceptorRegistry},
        transport::TransportBuilder,
    },
    tracing_setup::create_client_build_span,
};

/// Suffix tried after the bare identifier when looking up a named configuration.
pub const NAMED_CONFIGURATION_SUFFIX: &str = ".configuration";

/// Cache entry for one identifier.
#[derive(Default)]
struct ClientSlot {
    cell: OnceCell<Arc<ServiceClient>>,
    stale: AtomicBool,
}

impl ClientSlot {
    /// The built client, unless the slot was invalidated.
    fn ready(&self) -> Option<&Arc<ServiceClient>> {
        if self.is_stale() {
            None
        } else {
            self.cell.get()
        }
    }

    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }
}

/// Builds, caches and hands out one [`ServiceClient`] per identifier.
pub struct ClientFactory {
    source: Arc<dyn ConfigurationSource>,
    marshallers: Arc<dyn MarshallerRegistry>,
    interceptors: Arc<dyn InterceptorRegistry>,
    transport_builder: Arc<dyn TransportBuilder>,
    default_configuration: ClientConfiguration,
    configurations: HashMap<String, ClientConfiguration>,
    clients: HashMap<String, Arc<ClientSlot>>,
    // Slots in `clients` holding a built client, stale ones included
    built: AtomicUsize,
}

impl ClientFactory {
    pub fn new(
        source: Arc<dyn ConfigurationSource>,
        marshallers: Arc<dyn MarshallerRegistry>,
        interceptors: Arc<dyn InterceptorRegistry>,
        transport_builder: Arc<dyn TransportBuilder>,
    ) -> Self {
        Self {
            source,
            marshallers,
            interceptors,
            transport_builder,
            default_configuration: ClientConfiguration::new(),
            configurations: HashMap::new(),
            clients: HashMap::new(),
            built: AtomicUsize::new(0),
        }
    }

    /// Template used when no named configuration matches an identifier.
    pub fn with_default_configuration(mut self, configuration: ClientConfiguration) -> Self {
        self.default_configuration = configuration;
        self
    }

    pub fn source(&self) -> &Arc<dyn ConfigurationSource> {
        &self.source
    }

    /// Register a named configuration template.
    ///
    /// `name` is either the client identifier or `<id>.configuration`. A cached
    /// client for that identifier is dropped so the template takes effect.
    pub async fn register_configuration(
        &self,
        name: impl Into<String>,
        configuration: ClientConfiguration,
    ) {
        let name = name.into();
        match self.configurations.entry_async(name.clone()).await {
            scc::hash_map::Entry::Occupied(mut entry) => {
                *entry.get_mut() = configuration;
            }
            scc::hash_map::Entry::Vacant(entry) => {
                entry.insert_entry(configuration);
            }
        }

        let id = name
            .strip_suffix(NAMED_CONFIGURATION_SUFFIX)
            .unwrap_or(&name);
        self.invalidate(id).await;
    }

    /// Return the cached client for `id`, building it on first use.
    ///
    /// Concurrent first calls for the same identifier share a single build.
    pub async fn get_client(&self, id: &str) -> Result<Arc<ServiceClient>, ClientFactoryError> {
        if let Some(client) = self
            .clients
            .read_async(id, |_, slot| slot.ready().cloned())
            .await
            .flatten()
        {
            return Ok(client);
        }

        loop {
            let slot = self
                .clients
                .entry_async(id.to_string())
                .await
                .or_insert_with(|| Arc::new(ClientSlot::default()))
                .get()
                .clone();

            let result = slot
                .cell
                .get_or_try_init(|| async {
                    if slot.is_stale() {
                        return Err(None);
                    }
                    let built = self.build(id).await;
                    match &built {
                        Ok(_) => {
                            let count = self.built.fetch_add(1, Ordering::AcqRel) + 1;
                            metrics::set_cached_clients(count);
                        }
                        // Waiters must not retry on a slot that is about to be dropped
                        Err(_) => slot.mark_stale(),
                    }
                    built.map_err(Some)
                })
                .await;

            match result {
                Ok(client) if !slot.is_stale() => return Ok(client.clone()),
                Ok(_) | Err(None) => {
                    tracing::debug!(client = id, "Client invalidated while resolving, rebuilding");
                    self.remove_slot(id, &slot).await;
                }
                Err(Some(e)) => {
                    self.remove_slot(id, &slot).await;
                    return Err(e);
                }
            }
        }
    }

    /// Resolve and send one message through the client for `id`.
    pub async fn invoke(&self, id: &str, payload: Value) -> Result<Message, InvokeError> {
        self.invoke_with(id, Invocation::new(payload)).await
    }

    pub async fn invoke_with(
        &self,
        id: &str,
        invocation: Invocation,
    ) -> Result<Message, InvokeError> {
        let client = self.get_client(id).await?;
        Ok(client.call(invocation).await?)
    }

    /// Drop the cached client for `id`. Holders of the old client keep using it.
    ///
    /// A build still in progress is marked stale; its result is never handed out.
    pub async fn invalidate(&self, id: &str) -> bool {
        let mut pending = false;
        let removed = self
            .clients
            .remove_if_async(id, |slot| {
                if slot.cell.initialized() {
                    true
                } else {
                    pending = !slot.is_stale();
                    slot.mark_stale();
                    false
                }
            })
            .await;

        let invalidated = match removed {
            Some((_, slot)) => {
                self.release(1);
                !slot.is_stale()
            }
            None => pending,
        };
        if invalidated {
            tracing::info!(client = id, "Invalidated cached client");
            metrics::increment_cache_invalidations(id);
        }
        invalidated
    }

    /// Drop every cached client and return how many were invalidated.
    pub async fn invalidate_all(&self) -> usize {
        let mut invalidated = 0;
        let mut released = 0;
        let (invalidated_ref, released_ref) = (&mut invalidated, &mut released);
        self.clients
            .retain_async(|id, slot| {
                let fresh = !slot.is_stale();
                if fresh {
                    metrics::increment_cache_invalidations(id);
                    *invalidated_ref += 1;
                }
                if slot.cell.initialized() {
                    *released_ref += 1;
                    false
                } else {
                    slot.mark_stale();
                    true
                }
            })
            .await;
        self.release(released);
        tracing::info!("Invalidated {} cached clients", invalidated);
        invalidated
    }

    /// Drop the cached clients whose property group changed in the source.
    ///
    /// Builds still in progress may have read the previous snapshot, so they
    /// are invalidated too. Returns the invalidated identifiers; unchanged
    /// clients stay cached.
    pub async fn refresh(&self) -> Vec<String> {
        let mut changed = Vec::new();
        let mut released = 0;
        let (changed_ref, released_ref) = (&mut changed, &mut released);
        let source = &self.source;
        self.clients
            .retain_async(|id, slot| {
                let Some(client) = slot.cell.get() else {
                    if !slot.is_stale() {
                        slot.mark_stale();
                        changed_ref.push(id.clone());
                    }
                    return true;
                };
                if slot.is_stale() {
                    *released_ref += 1;
                    return false;
                }
                let key = format!("{}{}", client.configuration().property_prefix(), id);
                if source.group(&key).as_ref() == client.group() {
                    true
                } else {
                    changed_ref.push(id.clone());
                    *released_ref += 1;
                    false
                }
            })
            .await;
        self.release(released);

        changed.sort();
        for id in &changed {
            tracing::info!(client = %id, "Configuration changed, client invalidated");
            metrics::increment_cache_invalidations(id);
        }
        changed
    }

    pub async fn is_cached(&self, id: &str) -> bool {
        self.clients
            .read_async(id, |_, slot| slot.ready().is_some())
            .await
            .unwrap_or(false)
    }

    /// Identifiers with a built client, sorted.
    pub async fn cached_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        let ids_ref = &mut ids;
        self.clients
            .retain_async(|id, slot| {
                if slot.ready().is_some() {
                    ids_ref.push(id.clone());
                }
                true
            })
            .await;
        ids.sort();
        ids
    }

    /// Remove `slot` if it is still the entry for `id`.
    async fn remove_slot(&self, id: &str, slot: &Arc<ClientSlot>) {
        let removed = self
            .clients
            .remove_if_async(id, |current| Arc::ptr_eq(current, slot))
            .await;
        if let Some((_, removed)) = removed {
            if removed.cell.initialized() {
                self.release(1);
            }
        }
    }

    /// Account for `count` built slots leaving the map.
    fn release(&self, count: usize) {
        let remaining = if count == 0 {
            self.built.load(Ordering::Acquire)
        } else {
            self.built.fetch_sub(count, Ordering::AcqRel) - count
        };
        metrics::set_cached_clients(remaining);
    }

    /// Named template for `id`: `id`, then `id.configuration`, then the default.
    async fn named_configuration(&self, id: &str) -> ClientConfiguration {
        if let Some(entry) = self.configurations.get_async(id).await {
            return entry.get().clone();
        }
        let suffixed = format!("{id}{NAMED_CONFIGURATION_SUFFIX}");
        if let Some(entry) = self.configurations.get_async(&suffixed).await {
            return entry.get().clone();
        }
        self.default_configuration.clone()
    }

    /// Explicit name, then explicit type, then the first registered codec.
    fn resolve_marshaller(
        &self,
        configuration: &ClientConfiguration,
    ) -> Result<Arc<dyn Codec>, MarshallerResolutionError> {
        if let Some(name) = configuration.marshaller_bean_name() {
            return self
                .marshallers
                .lookup_by_name(name)
                .ok_or_else(|| MarshallerResolutionError::UnknownName(name.to_string()));
        }
        if let Some(codec_type) = configuration.marshaller_class_name() {
            return self
                .marshallers
                .lookup_by_type(codec_type)
                .into_iter()
                .next()
                .ok_or_else(|| MarshallerResolutionError::UnknownType(codec_type.to_string()));
        }
        self.marshallers
            .list_all()
            .into_iter()
            .next()
            .ok_or(MarshallerResolutionError::NoneAvailable)
    }

    async fn build(&self, id: &str) -> Result<Arc<ServiceClient>, ClientFactoryError> {
        let span = create_client_build_span(id);
        let result = self.build_inner(id).instrument(span.clone()).await;

        match &result {
            Ok(client) => {
                span.record("endpoint", client.default_uri().unwrap_or(""));
                span.record("interceptors", client.interceptor_names().join(",").as_str());
                tracing::info!(
                    client = id,
                    endpoint = client.default_uri().unwrap_or(""),
                    interceptors = ?client.interceptor_names(),
                    "Client built"
                );
            }
            Err(e) => tracing::warn!(client = id, error = %e, "Client build failed"),
        }
        metrics::increment_client_builds(id, result.is_ok());
        result
    }

    /// Effective configuration for `id` and the property group it was read from.
    ///
    /// Does not build or cache a client.
    pub async fn resolve_configuration(
        &self,
        id: &str,
    ) -> Result<(ClientConfiguration, Option<ConfigurationGroup>), ClientFactoryError> {
        let template = self.named_configuration(id).await;
        let key = format!("{}{}", template.property_prefix(), id);
        let group = self.source.group(&key);
        tracing::debug!(key = %key, found = group.is_some(), "Resolving client configuration");

        let configuration =
            template
                .resolve(group.as_ref())
                .map_err(|source| ClientFactoryError::Configuration {
                    client_id: id.to_string(),
                    source,
                })?;
        Ok((configuration, group))
    }

    async fn build_inner(&self, id: &str) -> Result<Arc<ServiceClient>, ClientFactoryError> {
        let (configuration, group) = self.resolve_configuration(id).await?;

        let codec = self.resolve_marshaller(&configuration).map_err(|source| {
            ClientFactoryError::Marshaller {
                client_id: id.to_string(),
                source,
            }
        })?;

        let security = WsSecurityInterceptor::from_config(&configuration)
            .map(|interceptor| Arc::new(interceptor) as Arc<dyn Interceptor>);
        let chain = InterceptorOrderingPolicy::build_chain(
            &configuration,
            self.interceptors.list_all(),
            security,
        );

        let transport = self
            .transport_builder
            .build(&configuration)
            .map_err(|source| ClientFactoryError::Transport {
                client_id: id.to_string(),
                source,
            })?;

        Ok(Arc::new(ServiceClient::new(
            id,
            configuration,
            group,
            codec,
            chain,
            transport,
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{Request, Response};
    use serde_json::json;

    use super::*;
    use crate::{
        adapters::{
            codecs::{CodecRegistry, JSON_CODEC_TYPE, JsonCodec},
            config_providers::memory::StaticConfigSource,
            interceptors::{LoggingInterceptor, StaticInterceptorRegistry},
        },
        config::client::PasswordType,
        core::error::RemoteCallError,
        ports::{
            transport::{Transport, TransportConstructionError, TransportResult},
        },
    };

    struct ReplyTransport(&'static str);

    #[async_trait]
    impl Transport for ReplyTransport {
        async fn send(&self, _req: Request<Bytes>) -> TransportResult<Response<Bytes>> {
            Ok(Response::new(Bytes::from_static(self.0.as_bytes())))
        }
    }

    #[derive(Default)]
    struct CountingBuilder {
        builds: AtomicUsize,
        fail: AtomicBool,
        extra_delay_ms: AtomicU64,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl CountingBuilder {
        fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }

        fn slow(delay: Duration) -> Self {
            let builder = Self::default();
            builder
                .extra_delay_ms
                .store(delay.as_millis() as u64, Ordering::SeqCst);
            builder
        }

        fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }
    }

    impl TransportBuilder for CountingBuilder {
        fn build(
            &self,
            _config: &ClientConfiguration,
        ) -> Result<Arc<dyn Transport>, TransportConstructionError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            // Widen the window in which concurrent first calls overlap
            let delay = 20 + self.extra_delay_ms.load(Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(delay));
            self.active.fetch_sub(1, Ordering::SeqCst);

            self.builds.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportConstructionError::InvalidPool(
                    "refused by test".to_string(),
                ));
            }
            Ok(Arc::new(ReplyTransport(r#"{"result": 3}"#)))
        }
    }

    struct SecurityStub;

    impl Interceptor for SecurityStub {
        fn name(&self) -> &str {
            "registry-security"
        }

        fn is_security(&self) -> bool {
            true
        }
    }

    fn factory_with(
        source: Arc<StaticConfigSource>,
        marshallers: CodecRegistry,
        builder: Arc<CountingBuilder>,
    ) -> ClientFactory {
        let interceptors = StaticInterceptorRegistry::default()
            .with(Arc::new(SecurityStub))
            .with(Arc::new(LoggingInterceptor::new()));
        ClientFactory::new(
            source,
            Arc::new(marshallers),
            Arc::new(interceptors),
            builder,
        )
    }

    fn factory(entries: &[(&str, &str)]) -> (ClientFactory, Arc<StaticConfigSource>, Arc<CountingBuilder>) {
        let source = Arc::new(StaticConfigSource::new(entries.iter().copied()));
        let builder = Arc::new(CountingBuilder::default());
        let factory = factory_with(source.clone(), CodecRegistry::with_builtin(), builder.clone());
        (factory, source, builder)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_share_one_build() {
        let (factory, _, builder) = factory(&[("soapclient.def.maths.endpoint", "http://calc/ws")]);
        let factory = Arc::new(factory);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let factory = factory.clone();
            handles.push(tokio::spawn(async move { factory.get_client("maths").await.unwrap() }));
        }

        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap());
        }
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
        assert_eq!(builder.builds(), 1);
        assert_eq!(factory.cached_ids().await, vec!["maths".to_string()]);
    }

    #[tokio::test]
    async fn test_cached_client_is_reused() {
        let (factory, _, builder) = factory(&[]);
        let first = factory.get_client("maths").await.unwrap();
        let second = factory.get_client("maths").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builder.builds(), 1);
    }

    #[tokio::test]
    async fn test_defaults_without_any_group() {
        let (factory, _, _) = factory(&[]);
        let client = factory.get_client("unknown").await.unwrap();
        let config = client.configuration();
        assert_eq!(config.connect_timeout(), Duration::from_millis(1000));
        assert!(!config.is_security_enabled());
        assert!(client.group().is_none());
        assert!(client.default_uri().is_none());
        assert_eq!(client.interceptor_names(), vec!["logging"]);
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let (factory, _, builder) = factory(&[]);
        builder.fail.store(true, Ordering::SeqCst);

        let err = factory.get_client("maths").await.unwrap_err();
        assert!(matches!(err, ClientFactoryError::Transport { ref client_id, .. } if client_id == "maths"));
        assert!(!factory.is_cached("maths").await);

        builder.fail.store(false, Ordering::SeqCst);
        assert!(factory.get_client("maths").await.is_ok());
        assert!(factory.is_cached("maths").await);
        assert_eq!(builder.builds(), 2);
    }

    #[tokio::test]
    async fn test_malformed_value_is_configuration_error() {
        let (factory, _, builder) = factory(&[("soapclient.def.maths.read_timeout", "soon")]);
        let err = factory.get_client("maths").await.unwrap_err();
        assert!(matches!(err, ClientFactoryError::Configuration { .. }));
        assert_eq!(builder.builds(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_forces_fresh_resolution() {
        let (factory, _, builder) = factory(&[]);
        let first = factory.get_client("maths").await.unwrap();
        assert!(factory.invalidate("maths").await);
        assert!(!factory.invalidate("maths").await);

        let second = factory.get_client("maths").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(builder.builds(), 2);

        factory.get_client("billing").await.unwrap();
        assert_eq!(factory.invalidate_all().await, 2);
        assert!(factory.cached_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_invalidates_only_changed_clients() {
        let (factory, source, _) = factory(&[
            ("soapclient.def.maths.read_timeout", "2000"),
            ("soapclient.def.billing.read_timeout", "3000"),
        ]);
        let maths = factory.get_client("maths").await.unwrap();
        let billing = factory.get_client("billing").await.unwrap();

        assert!(factory.refresh().await.is_empty());

        source.replace([
            ("soapclient.def.maths.read_timeout", "2500"),
            ("soapclient.def.billing.read_timeout", "3000"),
        ]);
        assert_eq!(factory.refresh().await, vec!["maths".to_string()]);

        let billing_again = factory.get_client("billing").await.unwrap();
        assert!(Arc::ptr_eq(&billing, &billing_again));
        let maths_again = factory.get_client("maths").await.unwrap();
        assert!(!Arc::ptr_eq(&maths, &maths_again));
        assert_eq!(maths_again.configuration().read_timeout(), Duration::from_millis(2500));
        // The old instance stays usable by whoever holds it
        assert_eq!(maths.configuration().read_timeout(), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_named_configuration_lookup_order() {
        let (factory, _, _) = factory(&[("soapclient.def.billing.connect_timeout", "400")]);
        factory
            .register_configuration(
                "billing.configuration",
                ClientConfiguration::new()
                    .with_read_timeout(Duration::from_millis(7000))
                    .with_connect_timeout(Duration::from_millis(900)),
            )
            .await;

        let billing = factory.get_client("billing").await.unwrap();
        assert_eq!(billing.configuration().read_timeout(), Duration::from_millis(7000));
        // The property group wins over the template
        assert_eq!(billing.configuration().connect_timeout(), Duration::from_millis(400));

        factory
            .register_configuration(
                "billing",
                ClientConfiguration::new().with_read_timeout(Duration::from_millis(1500)),
            )
            .await;
        assert!(!factory.is_cached("billing").await);
        let billing = factory.get_client("billing").await.unwrap();
        assert_eq!(billing.configuration().read_timeout(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_custom_prefix_from_template() {
        let (factory, _, _) = factory(&[("clients.maths.endpoint", "http://calc/ws")]);
        let factory = factory
            .with_default_configuration(ClientConfiguration::new().with_property_prefix("clients."));
        let client = factory.get_client("maths").await.unwrap();
        assert_eq!(client.default_uri(), Some("http://calc/ws"));
    }

    #[tokio::test]
    async fn test_marshaller_resolution() {
        let source = Arc::new(StaticConfigSource::new([
            ("soapclient.def.byname.marshaller_bean_name", "missing"),
            ("soapclient.def.bytype.marshaller_class_name", "xml"),
            ("soapclient.def.both.marshaller_bean_name", "json"),
            ("soapclient.def.both.marshaller_class_name", "xml"),
            ("soapclient.def.typed.marshaller_class_name", "json"),
        ]));
        let builder = Arc::new(CountingBuilder::default());
        let factory = factory_with(source.clone(), CodecRegistry::with_builtin(), builder.clone());

        assert!(matches!(
            factory.get_client("byname").await,
            Err(ClientFactoryError::Marshaller {
                source: MarshallerResolutionError::UnknownName(_),
                ..
            })
        ));
        assert!(matches!(
            factory.get_client("bytype").await,
            Err(ClientFactoryError::Marshaller {
                source: MarshallerResolutionError::UnknownType(_),
                ..
            })
        ));
        let both = factory.get_client("both").await.unwrap();
        assert_eq!(both.codec().codec_type(), JSON_CODEC_TYPE);
        assert!(factory.get_client("typed").await.is_ok());

        let empty = factory_with(source, CodecRegistry::new(), builder);
        assert!(matches!(
            empty.get_client("plain").await,
            Err(ClientFactoryError::Marshaller {
                source: MarshallerResolutionError::NoneAvailable,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_default_marshaller_is_first_registered() {
        let first: Arc<dyn Codec> = Arc::new(JsonCodec::new());
        let registry = CodecRegistry::new()
            .register("first", first.clone())
            .register("second", Arc::new(JsonCodec::new()));
        let source = Arc::new(StaticConfigSource::empty());
        let factory = factory_with(source, registry, Arc::new(CountingBuilder::default()));

        let client = factory.get_client("plain").await.unwrap();
        assert!(Arc::ptr_eq(client.codec(), &first));
    }

    #[tokio::test]
    async fn test_security_interceptor_is_prepended() {
        let (factory, _, _) = factory(&[
            ("soapclient.def.secure.security.username", "svc"),
            ("soapclient.def.secure.security.password", "pw"),
        ]);
        let client = factory.get_client("secure").await.unwrap();
        assert!(client.configuration().is_security_enabled());
        assert_eq!(
            client.configuration().security_password_type(),
            PasswordType::Text
        );
        assert_eq!(client.interceptor_names(), vec!["ws-security", "logging"]);
    }

    #[tokio::test]
    async fn test_invoke_distinguishes_build_and_call_errors() {
        let (factory, _, builder) = factory(&[("soapclient.def.maths.endpoint", "http://calc/ws")]);

        let reply = factory.invoke("maths", json!({"add": [1, 2]})).await.unwrap();
        assert_eq!(reply.body, json!({"result": 3}));

        assert!(matches!(
            factory.invoke("nowhere", json!({})).await,
            Err(InvokeError::Call(RemoteCallError::NoEndpoint(_)))
        ));

        factory.invalidate_all().await;
        builder.fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            factory.invoke("maths", json!({})).await,
            Err(InvokeError::Build(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_builds_leave_no_entries() {
        let (factory, _, builder) = factory(&[]);
        builder.fail.store(true, Ordering::SeqCst);

        for id in ["maths", "mahts", "math"] {
            assert!(factory.get_client(id).await.is_err());
        }
        assert!(factory.cached_ids().await.is_empty());
        assert_eq!(factory.clients.len(), 0);
        assert_eq!(factory.built.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_built_count_follows_invalidation() {
        let (factory, source, _) = factory(&[("soapclient.def.maths.read_timeout", "2000")]);
        factory.get_client("maths").await.unwrap();
        factory.get_client("billing").await.unwrap();
        factory.get_client("maths").await.unwrap();
        assert_eq!(factory.built.load(Ordering::SeqCst), 2);

        assert!(factory.invalidate("billing").await);
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);

        source.replace([("soapclient.def.maths.read_timeout", "2500")]);
        assert_eq!(factory.refresh().await, vec!["maths".to_string()]);
        assert_eq!(factory.built.load(Ordering::SeqCst), 0);
        assert_eq!(factory.clients.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_refresh_during_build_discards_stale_client() {
        let source = Arc::new(StaticConfigSource::new([(
            "soapclient.def.maths.read_timeout",
            "2000",
        )]));
        let builder = Arc::new(CountingBuilder::slow(Duration::from_millis(300)));
        let factory = Arc::new(factory_with(
            source.clone(),
            CodecRegistry::with_builtin(),
            builder.clone(),
        ));

        let pending = {
            let factory = factory.clone();
            tokio::spawn(async move { factory.get_client("maths").await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        source.replace([("soapclient.def.maths.read_timeout", "2500")]);
        assert_eq!(factory.refresh().await, vec!["maths".to_string()]);

        let first = pending.await.unwrap();
        assert_eq!(first.configuration().read_timeout(), Duration::from_millis(2500));
        let next = factory.get_client("maths").await.unwrap();
        assert!(Arc::ptr_eq(&first, &next));
        assert_eq!(builder.builds(), 2);
        assert_eq!(builder.max_active(), 1);
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_invalidate_during_build_never_overlaps_builds() {
        let source = Arc::new(StaticConfigSource::empty());
        let builder = Arc::new(CountingBuilder::slow(Duration::from_millis(300)));
        let factory = Arc::new(factory_with(
            source,
            CodecRegistry::with_builtin(),
            builder.clone(),
        ));

        let spawn_get = |factory: Arc<ClientFactory>| {
            tokio::spawn(async move { factory.get_client("maths").await.unwrap() })
        };
        let first = spawn_get(factory.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(factory.invalidate("maths").await);
        assert!(!factory.is_cached("maths").await);
        let second = spawn_get(factory.clone());

        let (first, second) = (first.await.unwrap(), second.await.unwrap());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builder.max_active(), 1);
        assert_eq!(builder.builds(), 2);
        assert_eq!(factory.cached_ids().await, vec!["maths".to_string()]);
    }
}
