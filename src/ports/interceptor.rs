use std::{any::TypeId, fmt, sync::Arc};

use http::HeaderMap;
use thiserror::Error;
use uuid::Uuid;

use crate::ports::codec::Message;

/// Error type for interceptor callbacks
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum InterceptorError {
    /// The interceptor refused to let the message through
    #[error("Interceptor '{interceptor}' rejected the message: {message}")]
    Rejected {
        interceptor: String,
        message: String,
    },

    /// The interceptor could not process the message
    #[error("Interceptor '{interceptor}' failed: {message}")]
    Failed {
        interceptor: String,
        message: String,
    },
}

/// Result type alias for interceptor callbacks
pub type InterceptorResult<T> = Result<T, InterceptorError>;

/// Per-invocation state shared by every interceptor in a chain.
#[derive(Debug)]
pub struct MessageContext {
    pub client_id: String,
    pub endpoint: String,
    pub message_id: Uuid,
    pub soap_action: Option<String>,
    pub request: Message,
    /// Set by the transport, or by a request interceptor that answers locally
    pub response: Option<Message>,
    /// Extra transport headers attached to the outbound request
    pub headers: HeaderMap,
}

impl MessageContext {
    pub fn new(client_id: impl Into<String>, endpoint: impl Into<String>, request: Message) -> Self {
        Self {
            client_id: client_id.into(),
            endpoint: endpoint.into(),
            message_id: Uuid::new_v4(),
            soap_action: None,
            request,
            response: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn has_fault(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.fault.is_some())
    }
}

/// Cross-cutting handler invoked around every outbound message.
///
/// Request callbacks run in chain order; response, fault and completion
/// callbacks run in reverse. Returning `Ok(false)` stops the current phase.
pub trait Interceptor: Send + Sync + 'static {
    /// Human readable name used in logs
    fn name(&self) -> &str;

    /// Concrete type used for type-directed substitution.
    fn interceptor_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    /// Security interceptors are always placed first in a chain.
    fn is_security(&self) -> bool {
        false
    }

    fn handle_request(&self, _ctx: &mut MessageContext) -> InterceptorResult<bool> {
        Ok(true)
    }

    fn handle_response(&self, _ctx: &mut MessageContext) -> InterceptorResult<bool> {
        Ok(true)
    }

    fn handle_fault(&self, _ctx: &mut MessageContext) -> InterceptorResult<bool> {
        Ok(true)
    }

    /// Called once the exchange is over, whether it failed or not.
    fn after_completion(&self, _ctx: &MessageContext, _failed: bool) {}
}

impl fmt::Debug for dyn Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Interceptor").field(&self.name()).finish()
    }
}

/// InterceptorRegistry enumerates the process-wide interceptor instances
pub trait InterceptorRegistry: Send + Sync + 'static {
    /// All available interceptors, in a stable order
    fn list_all(&self) -> Vec<Arc<dyn Interceptor>>;
}

/// Identity comparison for shared interceptor handles.
pub fn same_interceptor(a: &Arc<dyn Interceptor>, b: &Arc<dyn Interceptor>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}
