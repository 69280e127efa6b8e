use crate::{config::client::ClientConfiguration, ports::transport::TransportConstructionError};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, TransportConstructionError>;

/// Checks the transport-relevant parts of a resolved client configuration
pub struct ClientConfigValidator;

impl ClientConfigValidator {
    /// Validate the whole configuration, returning the first problem found.
    pub fn validate(config: &ClientConfiguration) -> ValidationResult<()> {
        match Self::collect_errors(config).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Every problem found, for reporting them all at once
    pub fn collect_errors(config: &ClientConfiguration) -> Vec<TransportConstructionError> {
        let mut errors = Vec::new();

        if let Some(endpoint) = config.endpoint().filter(|e| !e.trim().is_empty()) {
            if let Err(e) = Self::validate_url(endpoint) {
                errors.push(e);
            }
        }

        if let Err(e) = Self::validate_proxy(config) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_pool(config) {
            errors.push(e);
        }

        errors
    }

    /// Validate URL format
    fn validate_url(url_str: &str) -> ValidationResult<()> {
        let invalid = |reason: String| TransportConstructionError::InvalidEndpoint {
            endpoint: url_str.to_string(),
            reason,
        };
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(invalid(format!(
                        "URL scheme must be 'http' or 'https', got '{}'",
                        url.scheme()
                    )));
                }

                if url.host().is_none() {
                    return Err(invalid("URL must have a valid host".to_string()));
                }

                Ok(())
            }
            Err(e) => Err(invalid(format!("Invalid URL format: {e}"))),
        }
    }

    /// An enabled proxy needs a usable host and a non-zero port.
    fn validate_proxy(config: &ClientConfiguration) -> ValidationResult<()> {
        if !config.is_proxy_enabled() {
            return Ok(());
        }

        let host = config.proxy_host().map(str::trim).unwrap_or_default();
        if host.is_empty() {
            return Err(TransportConstructionError::InvalidProxy(
                "proxy is enabled but no host is set".to_string(),
            ));
        }
        if host.contains("://") || host.contains('/') {
            return Err(TransportConstructionError::InvalidProxy(format!(
                "proxy host should be a bare host name, got '{host}'"
            )));
        }

        match config.proxy_port() {
            None | Some(0) => Err(TransportConstructionError::InvalidProxy(format!(
                "proxy host '{host}' needs a port between 1 and 65535"
            ))),
            Some(_) => Ok(()),
        }
    }

    fn validate_pool(config: &ClientConfiguration) -> ValidationResult<()> {
        let total = config.pool_max_total_connections();
        let per_route = config.pool_max_route_connections();

        if total == 0 {
            return Err(TransportConstructionError::InvalidPool(
                "max_total_connections must be greater than 0".to_string(),
            ));
        }
        if per_route == 0 {
            return Err(TransportConstructionError::InvalidPool(
                "max_route_connections must be greater than 0".to_string(),
            ));
        }
        if per_route > total {
            return Err(TransportConstructionError::InvalidPool(format!(
                "max_route_connections ({per_route}) exceeds max_total_connections ({total})"
            )));
        }
        if config.pool_idle_timeout().is_zero() {
            return Err(TransportConstructionError::InvalidPool(
                "idle_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Format multiple validation errors into a single message
    pub fn format_multiple_errors(errors: &[TransportConstructionError]) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
