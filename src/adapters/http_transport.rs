use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Request, Response, header};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::{
    config::{client::ClientConfiguration, validation::ClientConfigValidator},
    metrics,
    ports::transport::{
        Transport, TransportBuilder, TransportConstructionError, TransportError, TransportResult,
        is_idempotent,
    },
    tracing_setup::create_transport_attempt_span,
    utils::connection_gate::{ConnectionGate, spawn_idle_sweep},
};

/// Attempts made for an idempotent request: the first try plus one retry.
const MAX_ATTEMPTS: u32 = 2;

/// Builds one pooled [`HttpTransport`] per client configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransportBuilder;

impl HttpTransportBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl TransportBuilder for HttpTransportBuilder {
    fn build(
        &self,
        config: &ClientConfiguration,
    ) -> Result<Arc<dyn Transport>, TransportConstructionError> {
        Ok(Arc::new(HttpTransport::new(config)?))
    }
}

/// HTTP transport backed by `reqwest`.
///
/// Responsibilities:
/// * Timeouts, cookie handling, proxy and pool sizing from the client configuration
/// * Total and per-route admission through a [`ConnectionGate`]
/// * A single retry of idempotent requests that failed to connect or broke mid-flight
/// * Dropping caller-set framing headers so the body is framed by the client
pub struct HttpTransport {
    client: reqwest::Client,
    gate: Arc<ConnectionGate>,
    sweeper: JoinHandle<()>,
}

impl HttpTransport {
    /// Create a transport for `config`. Must be called inside a tokio runtime.
    pub fn new(config: &ClientConfiguration) -> Result<Self, TransportConstructionError> {
        ClientConfigValidator::validate(config)?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .cookie_store(!config.cookies_disabled())
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.pool_max_route_connections() as usize);

        builder = match Self::proxy(config)? {
            Some(proxy) => builder.proxy(proxy),
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|e| TransportConstructionError::Client(e.to_string()))?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportConstructionError::Runtime(e.to_string()))?;

        let gate = Arc::new(ConnectionGate::new(
            config.pool_max_total_connections(),
            config.pool_max_route_connections(),
            config.connect_request_timeout(),
        ));
        let sweeper = {
            let _guard = runtime.enter();
            spawn_idle_sweep(Arc::downgrade(&gate), config.pool_idle_timeout())
        };

        tracing::debug!(
            connect_timeout_ms = config.connect_timeout().as_millis() as u64,
            read_timeout_ms = config.read_timeout().as_millis() as u64,
            max_total = config.pool_max_total_connections(),
            max_per_route = config.pool_max_route_connections(),
            proxy = config.is_proxy_enabled(),
            "Created HTTP transport"
        );

        Ok(Self {
            client,
            gate,
            sweeper,
        })
    }

    fn proxy(
        config: &ClientConfiguration,
    ) -> Result<Option<reqwest::Proxy>, TransportConstructionError> {
        if !config.is_proxy_enabled() {
            return Ok(None);
        }
        let (Some(host), Some(port)) = (config.proxy_host(), config.proxy_port()) else {
            return Err(TransportConstructionError::InvalidProxy(
                "proxy host and port are both required".to_string(),
            ));
        };

        let mut proxy = reqwest::Proxy::all(proxy_url(host, port))
            .map_err(|e| TransportConstructionError::InvalidProxy(e.to_string()))?;
        if let Some(username) = config.proxy_username() {
            let password = config.proxy_password().map(|p| p.expose()).unwrap_or_default();
            proxy = proxy.basic_auth(username, password);
        }
        Ok(Some(proxy))
    }

    pub fn gate(&self) -> &ConnectionGate {
        &self.gate
    }

    fn route(req: &Request<Bytes>) -> String {
        format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            req.uri()
                .authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        )
    }

    /// Remove headers that would conflict with the framing chosen by the client.
    pub fn strip_framing_headers(headers: &mut HeaderMap) {
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::TRANSFER_ENCODING);
    }

    async fn attempt(
        &self,
        route: &str,
        method: &http::Method,
        url: &str,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> TransportResult<Response<Bytes>> {
        let _permit = self.gate.acquire(route).await?;

        let response = self
            .client
            .request(method.clone(), url)
            .headers(headers.clone())
            .body(body.clone())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let version = response.version();
        let response_headers = response.headers().clone();
        let body = response.bytes().await.map_err(classify)?;

        let mut out = Response::builder()
            .status(status)
            .version(version)
            .body(body)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        *out.headers_mut() = response_headers;
        Ok(out)
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

/// Map a client error onto the transport taxonomy. Timeouts are checked
/// first since a connect timeout is also a connect error.
fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Io(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, req: Request<Bytes>) -> TransportResult<Response<Bytes>> {
        if req.uri().host().is_none() {
            return Err(TransportError::InvalidRequest(format!(
                "Outgoing URI has no host: {}",
                req.uri()
            )));
        }

        let route = Self::route(&req);
        let retryable = is_idempotent(&req);
        let (mut parts, body) = req.into_parts();
        Self::strip_framing_headers(&mut parts.headers);
        let url = parts.uri.to_string();

        let mut attempt = 1;
        loop {
            let span = create_transport_attempt_span(&route, attempt);
            let result = self
                .attempt(&route, &parts.method, &url, &parts.headers, &body)
                .instrument(span)
                .await;

            match result {
                Err(err) if retryable && err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(
                        route = %route,
                        method = %parts.method,
                        error = %err,
                        "Transport attempt failed, retrying"
                    );
                    metrics::increment_transport_retries(&route);
                    attempt += 1;
                }
                Err(err) => {
                    tracing::debug!(route = %route, error = %err, attempt, "Transport failed");
                    return Err(err);
                }
                Ok(response) => return Ok(response),
            }
        }
    }
}

/// `http://host:port`, with IPv6 literals bracketed.
fn proxy_url(host: &str, port: u16) -> String {
    let host = host.trim();
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::Method;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::{
        config::client::{PoolSettings, ProxySettings},
        ports::transport::Idempotent,
    };

    /// Serves `200 ok` on every connection except the first, which is closed unanswered.
    async fn flaky_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = connections.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let _ = stream.read(&mut buf).await;
                    if seen == 0 {
                        return;
                    }
                    let _ = stream
                        .write_all(
                            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                        )
                        .await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        (format!("http://{addr}/ws"), connections)
    }

    fn request(method: Method, url: &str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(url)
            .header(header::CONTENT_LENGTH, "999")
            .body(Bytes::from_static(b"{}"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_idempotent_request_is_retried_once() {
        let (url, connections) = flaky_server().await;
        let transport = HttpTransport::new(&ClientConfiguration::new()).unwrap();

        let response = transport.send(request(Method::GET, &url)).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.body().as_ref(), b"ok");
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_post_is_not_retried() {
        let (url, connections) = flaky_server().await;
        let transport = HttpTransport::new(&ClientConfiguration::new()).unwrap();

        let err = transport.send(request(Method::POST, &url)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(connections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_marked_post_is_retried() {
        let (url, connections) = flaky_server().await;
        let transport = HttpTransport::new(&ClientConfiguration::new()).unwrap();

        let mut req = request(Method::POST, &url);
        req.extensions_mut().insert(Idempotent);
        let response = transport.send(req).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(&ClientConfiguration::new()).unwrap();
        let err = transport
            .send(request(Method::GET, &format!("http://{addr}/")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_rejects_bad_proxy() {
        let config = ClientConfiguration::new().with_proxy(ProxySettings {
            host: Some("  ".to_string()),
            port: Some(3128),
            ..Default::default()
        });
        assert!(matches!(
            HttpTransport::new(&config),
            Err(TransportConstructionError::InvalidProxy(_))
        ));
    }

    #[tokio::test]
    async fn test_builds_with_proxy_and_pool() {
        let config = ClientConfiguration::new()
            .with_proxy(ProxySettings {
                host: Some("proxy.local".to_string()),
                port: Some(3128),
                username: Some("user".to_string()),
                password: None,
            })
            .with_pool(PoolSettings {
                max_total_connections: Some(4),
                max_route_connections: Some(2),
                idle_timeout_ms: Some(500),
            });
        let transport = HttpTransport::new(&config).unwrap();
        let stats = transport.gate().stats();
        assert_eq!(stats.max_total, 4);
        assert_eq!(stats.max_per_route, 2);
    }

    #[test]
    fn test_proxy_url_brackets_ipv6_hosts() {
        assert_eq!(proxy_url(" proxy.local ", 3128), "http://proxy.local:3128");
        assert_eq!(proxy_url("::1", 3128), "http://[::1]:3128");
        assert_eq!(proxy_url("[fd00::7]", 8080), "http://[fd00::7]:8080");
    }

    #[tokio::test]
    async fn test_builds_with_ipv6_proxy() {
        let config = ClientConfiguration::new().with_proxy(ProxySettings {
            host: Some("::1".to_string()),
            port: Some(3128),
            ..Default::default()
        });
        assert!(HttpTransport::new(&config).is_ok());
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(
            HttpTransport::new(&ClientConfiguration::new()),
            Err(TransportConstructionError::Runtime(_))
        ));
    }

    #[test]
    fn test_strip_framing_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, "10".parse().unwrap());
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        HttpTransport::strip_framing_headers(&mut headers);
        assert_eq!(headers.len(), 1);
    }
}
