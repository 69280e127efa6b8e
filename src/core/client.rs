//! The cached, ready-to-use client for one logical remote service.
//!
//! A [`ServiceClient`] bundles everything resolved for an identifier: the
//! default endpoint, the codec, the ordered interceptor chain and a transport
//! with its own connection pool. It is immutable and shared as
//! `Arc<ServiceClient>` by every caller of the factory.
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderValue, Method, Request, Uri, header};
use serde_json::Value;
use tracing::Instrument;

use crate::{
    config::{client::ClientConfiguration, group::ConfigurationGroup},
    core::error::RemoteCallError,
    metrics::{self, RemoteCallTimer},
    ports::{
        codec::{Codec, Message},
        interceptor::{Interceptor, MessageContext},
        transport::{Idempotent, Transport, TransportError},
    },
    tracing_setup::create_remote_call_span,
};

/// Header names are stored lowercase; peers match them case-insensitively.
pub const SOAP_ACTION_HEADER: &str = "soapaction";

/// One outbound message and its per-call options.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    message: Message,
    uri: Option<String>,
    soap_action: Option<String>,
    idempotent: bool,
}

impl Invocation {
    pub fn new(body: Value) -> Self {
        Self {
            message: Message::new(body),
            ..Default::default()
        }
    }

    pub fn from_message(message: Message) -> Self {
        Self {
            message,
            ..Default::default()
        }
    }

    /// Send to `uri` instead of the client's default endpoint.
    pub fn to(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_soap_action(mut self, action: impl Into<String>) -> Self {
        self.soap_action = Some(action.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, block: Value) -> Self {
        self.message.set_header(name, block);
        self
    }

    /// Mark the call as safe to repeat after a connection failure.
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }
}

/// Ready-to-use client for one logical service.
pub struct ServiceClient {
    id: String,
    default_uri: Option<String>,
    codec: Arc<dyn Codec>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Arc<dyn Transport>,
    configuration: ClientConfiguration,
    /// Property group the client was resolved from, compared on refresh
    group: Option<ConfigurationGroup>,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("id", &self.id)
            .field("default_uri", &self.default_uri)
            .field("codec", &self.codec.codec_type())
            .field("interceptors", &self.interceptor_names())
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    pub fn new(
        id: impl Into<String>,
        configuration: ClientConfiguration,
        group: Option<ConfigurationGroup>,
        codec: Arc<dyn Codec>,
        interceptors: Vec<Arc<dyn Interceptor>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            id: id.into(),
            default_uri: configuration
                .endpoint()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            codec,
            interceptors,
            transport,
            configuration,
            group,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn default_uri(&self) -> Option<&str> {
        self.default_uri.as_deref()
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    pub fn interceptor_names(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    pub fn configuration(&self) -> &ClientConfiguration {
        &self.configuration
    }

    pub fn group(&self) -> Option<&ConfigurationGroup> {
        self.group.as_ref()
    }

    /// Send `body` to the default endpoint and return the decoded response.
    pub async fn send_and_receive(&self, body: Value) -> Result<Message, RemoteCallError> {
        self.call(Invocation::new(body)).await
    }

    /// Send `body` to an explicit endpoint.
    pub async fn send_to(&self, uri: &str, body: Value) -> Result<Message, RemoteCallError> {
        self.call(Invocation::new(body).to(uri)).await
    }

    /// Run one exchange through the interceptor chain and the transport.
    pub async fn call(&self, invocation: Invocation) -> Result<Message, RemoteCallError> {
        let endpoint = invocation
            .uri
            .clone()
            .or_else(|| self.default_uri.clone())
            .ok_or_else(|| RemoteCallError::NoEndpoint(self.id.clone()))?;
        let uri = parse_endpoint(&endpoint)?;

        let mut ctx = MessageContext::new(&self.id, endpoint, invocation.message);
        ctx.soap_action = invocation.soap_action;

        let span = create_remote_call_span(&self.id, &ctx.endpoint, &ctx.message_id.to_string());
        let timer = RemoteCallTimer::new(&self.id);
        let mut ran = 0;
        let result = self
            .exchange(&mut ctx, &uri, invocation.idempotent, &mut ran)
            .instrument(span.clone())
            .await;

        let failed = result.is_err();
        for interceptor in self.interceptors[..ran].iter().rev() {
            interceptor.after_completion(&ctx, failed);
        }

        span.record("duration_ms", timer.elapsed().as_millis() as u64);
        let outcome = match &result {
            Ok(()) => "success",
            Err(RemoteCallError::Fault { .. }) => "fault",
            Err(RemoteCallError::Status { .. }) => "status",
            Err(_) => "error",
        };
        metrics::increment_remote_calls(&self.id, outcome);

        result.map(|()| ctx.response.take().unwrap_or_default())
    }

    async fn exchange(
        &self,
        ctx: &mut MessageContext,
        uri: &Uri,
        idempotent: bool,
        ran: &mut usize,
    ) -> Result<(), RemoteCallError> {
        for (index, interceptor) in self.interceptors.iter().enumerate() {
            *ran = index + 1;
            if !interceptor.handle_request(ctx)? {
                tracing::debug!("Interceptor '{}' stopped the request", interceptor.name());
                if ctx.response.is_none() {
                    return Err(RemoteCallError::Intercepted(interceptor.name().to_string()));
                }
                return self.handle_reply(ctx, index + 1);
            }
        }

        let request = self.encode_request(ctx, uri, idempotent)?;
        let response = self.transport.send(request).await?;
        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        let body = response.into_body();
        match self.codec.decode(&body) {
            Ok(message) => ctx.response = Some(message),
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(RemoteCallError::Status {
                    status,
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
        }

        if !status.is_success() && !ctx.has_fault() {
            return Err(RemoteCallError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        self.handle_reply(ctx, self.interceptors.len())
    }

    /// Response or fault phase, in reverse over the first `upto` interceptors.
    fn handle_reply(&self, ctx: &mut MessageContext, upto: usize) -> Result<(), RemoteCallError> {
        let fault = ctx
            .response
            .as_ref()
            .and_then(|r| r.fault.clone());

        for interceptor in self.interceptors[..upto].iter().rev() {
            let proceed = if fault.is_some() {
                interceptor.handle_fault(ctx)?
            } else {
                interceptor.handle_response(ctx)?
            };
            if !proceed {
                break;
            }
        }

        match fault {
            Some(fault) => Err(RemoteCallError::Fault {
                code: fault.code,
                reason: fault.reason,
            }),
            None => Ok(()),
        }
    }

    fn encode_request(
        &self,
        ctx: &MessageContext,
        uri: &Uri,
        idempotent: bool,
    ) -> Result<Request<Bytes>, RemoteCallError> {
        let body = self.codec.encode(&ctx.request)?;

        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri.clone())
            .body(body)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let headers = request.headers_mut();
        headers.extend(ctx.headers.clone());
        let content_type = HeaderValue::from_str(self.codec.content_type())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        headers.insert(header::CONTENT_TYPE, content_type);
        if let Some(action) = &ctx.soap_action {
            let value = HeaderValue::from_str(&format!("\"{action}\""))
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            headers.insert(SOAP_ACTION_HEADER, value);
        }

        if idempotent {
            request.extensions_mut().insert(Idempotent);
        }
        Ok(request)
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Uri, RemoteCallError> {
    let invalid = |reason: String| RemoteCallError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };
    let uri: Uri = endpoint.parse().map_err(|e| invalid(format!("{e}")))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        other => {
            return Err(invalid(format!(
                "scheme must be 'http' or 'https', got '{}'",
                other.unwrap_or("")
            )));
        }
    }
    if uri.host().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(uri)
}
