pub mod client;
pub mod group;
pub mod loader;
pub mod validation;

pub use client::{ClientConfiguration, PasswordType, SecurityAction};
pub use group::{ConfigurationError, ConfigurationGroup};
pub use loader::load_properties;
pub use validation::ClientConfigValidator;
