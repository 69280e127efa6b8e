use std::sync::Arc;

use crate::ports::interceptor::{
    Interceptor, InterceptorRegistry, InterceptorResult, MessageContext,
};

/// Logs each exchange at debug level; faults are logged as warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self
    }
}

impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    fn handle_request(&self, ctx: &mut MessageContext) -> InterceptorResult<bool> {
        tracing::debug!(
            client = %ctx.client_id,
            endpoint = %ctx.endpoint,
            message_id = %ctx.message_id,
            soap_action = ctx.soap_action.as_deref().unwrap_or(""),
            "Sending message"
        );
        Ok(true)
    }

    fn handle_response(&self, ctx: &mut MessageContext) -> InterceptorResult<bool> {
        tracing::debug!(
            client = %ctx.client_id,
            message_id = %ctx.message_id,
            "Received response"
        );
        Ok(true)
    }

    fn handle_fault(&self, ctx: &mut MessageContext) -> InterceptorResult<bool> {
        if let Some(fault) = ctx.response.as_ref().and_then(|r| r.fault.as_ref()) {
            tracing::warn!(
                client = %ctx.client_id,
                message_id = %ctx.message_id,
                code = %fault.code,
                reason = %fault.reason,
                "Received fault"
            );
        }
        Ok(true)
    }

    fn after_completion(&self, ctx: &MessageContext, failed: bool) {
        tracing::debug!(
            client = %ctx.client_id,
            message_id = %ctx.message_id,
            failed,
            "Exchange completed"
        );
    }
}

/// Fixed, ordered set of process-wide interceptors
#[derive(Debug, Default, Clone)]
pub struct StaticInterceptorRegistry {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl StaticInterceptorRegistry {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn with(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }
}

impl InterceptorRegistry for StaticInterceptorRegistry {
    fn list_all(&self) -> Vec<Arc<dyn Interceptor>> {
        self.interceptors.clone()
    }
}
