pub mod client;
pub mod error;
pub mod factory;
pub mod ordering;
pub mod security;

pub use client::{Invocation, ServiceClient};
pub use error::{ClientFactoryError, InvokeError, RemoteCallError};
pub use factory::ClientFactory;
pub use ordering::InterceptorOrderingPolicy;
pub use security::WsSecurityInterceptor;
